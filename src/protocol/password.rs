//! Password hashing for MD5 and SCRAM-SHA-256 authentication.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// SASL mechanism name
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// GS2 header of a client without channel binding.
const GS2_HEADER: &str = "n,,";

/// Reply to an MD5 challenge: `"md5" + hex(md5(hex(md5(password + user)) + salt))`.
pub fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = Md5::new()
        .chain_update(password)
        .chain_update(user)
        .finalize();
    let outer = Md5::new()
        .chain_update(format!("{inner:x}"))
        .chain_update(salt)
        .finalize();
    format!("md5{outer:x}")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|e| Error::Auth(format!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

#[derive(Debug)]
enum Stage {
    /// client-first sent, waiting for server-first
    Started,
    /// client-final sent, waiting for the server signature
    Proved { server_signature: [u8; 32] },
    Verified,
}

/// Client side of a SCRAM-SHA-256 exchange (RFC 7677).
///
/// The user name is left empty in the client-first message; the server takes
/// it from the startup packet.
#[derive(Debug)]
pub struct ScramClient {
    password: String,
    nonce: String,
    stage: Stage,
}

impl ScramClient {
    /// Start an exchange with a random 24-byte nonce.
    pub fn new(password: &str) -> Self {
        let mut raw = [0u8; 24];
        rand::rng().fill(&mut raw);
        Self::with_nonce(password, &STANDARD.encode(raw))
    }

    pub fn with_nonce(password: &str, nonce: &str) -> Self {
        Self {
            password: password.to_string(),
            nonce: nonce.to_string(),
            stage: Stage::Started,
        }
    }

    fn first_bare(&self) -> String {
        format!("n=,r={}", self.nonce)
    }

    pub fn client_first_message(&self) -> String {
        format!("{GS2_HEADER}{}", self.first_bare())
    }

    /// Answer server-first (`r=<nonce>,s=<salt>,i=<iterations>`) with
    /// client-final.
    pub fn client_final_message(&mut self, server_first: &str) -> Result<String> {
        if !matches!(self.stage, Stage::Started) {
            return Err(Error::Auth("unexpected second server-first-message".into()));
        }

        let attribute = |key: &str| {
            server_first
                .split(',')
                .find_map(|part| part.strip_prefix(key))
                .ok_or_else(|| Error::Auth(format!("server-first-message lacks {key}")))
        };
        let nonce = attribute("r=")?;
        let salt = STANDARD
            .decode(attribute("s=")?)
            .map_err(|e| Error::Auth(format!("invalid SCRAM salt: {e}")))?;
        let iterations: u32 = attribute("i=")?
            .parse()
            .map_err(|e| Error::Auth(format!("invalid SCRAM iteration count: {e}")))?;

        if !nonce.starts_with(&self.nonce) || nonce.len() == self.nonce.len() {
            return Err(Error::Auth(
                "server nonce does not extend the client nonce".into(),
            ));
        }

        let mut salted = [0u8; 32];
        pbkdf2_hmac::<Sha256>(self.password.as_bytes(), &salt, iterations, &mut salted);

        let without_proof = format!("c={},r={nonce}", STANDARD.encode(GS2_HEADER));
        let auth_message = format!("{},{server_first},{without_proof}", self.first_bare());

        let client_key = hmac_sha256(&salted, b"Client Key")?;
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();
        let signature = hmac_sha256(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(signature)
            .map(|(key, sig)| key ^ sig)
            .collect();

        let server_key = hmac_sha256(&salted, b"Server Key")?;
        self.stage = Stage::Proved {
            server_signature: hmac_sha256(&server_key, auth_message.as_bytes())?,
        };

        Ok(format!("{without_proof},p={}", STANDARD.encode(proof)))
    }

    /// Check server-final (`v=<signature>`).
    pub fn verify_server_final(&mut self, server_final: &str) -> Result<()> {
        let Stage::Proved { server_signature } = &self.stage else {
            return Err(Error::Auth(
                "server-final-message received out of order".into(),
            ));
        };
        if let Some(reason) = server_final.strip_prefix("e=") {
            return Err(Error::Auth(format!("SCRAM exchange failed: {reason}")));
        }
        let received = server_final
            .strip_prefix("v=")
            .ok_or_else(|| Error::Auth(format!("malformed server-final-message: {server_final}")))
            .and_then(|b64| {
                STANDARD
                    .decode(b64)
                    .map_err(|e| Error::Auth(format!("invalid server signature: {e}")))
            })?;
        if received != server_signature {
            return Err(Error::Auth("server signature mismatch".into()));
        }
        self.stage = Stage::Verified;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_password() {
        // md5(md5("secret" + "alice")) over the salt, as libpq computes it
        let inner = format!("{:x}", Md5::digest(b"secretalice"));
        let mut outer_input = inner.into_bytes();
        outer_input.extend_from_slice(&[1, 2, 3, 4]);
        let expected = format!("md5{:x}", Md5::digest(&outer_input));

        assert_eq!(md5_password("alice", "secret", &[1, 2, 3, 4]), expected);
        assert_eq!(expected.len(), 35);
        assert_ne!(
            md5_password("alice", "secret", &[0, 0, 0, 0]),
            md5_password("alice", "secret", &[0, 0, 0, 1])
        );
    }

    #[test]
    fn test_scram_client_first() {
        let client = ScramClient::with_nonce("pw", "rOprNGfwEbeRWgbNEkqO");
        assert_eq!(client.client_first_message(), "n,,n=,r=rOprNGfwEbeRWgbNEkqO");
    }

    #[test]
    fn test_scram_rejects_foreign_nonce() {
        let mut client = ScramClient::with_nonce("pw", "abc");
        assert!(matches!(
            client.client_final_message("r=xyz123,s=QSXCR+Q6sek8bf92,i=4096"),
            Err(Error::Auth(_))
        ));
        assert!(client.client_final_message("r=abc,s=QSXCR+Q6sek8bf92,i=4096").is_err());
        assert!(client.client_final_message("r=abcdef,i=4096").is_err());
    }

    #[test]
    fn test_scram_server_signature() {
        let mut client = ScramClient::with_nonce("pencil", "rOprNGfwEbeRWgbNEkqO");
        let server_first = "r=rOprNGfwEbeRWgbNEkqOsrvnonce,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        let client_final = client.client_final_message(server_first).unwrap();
        assert!(client_final.starts_with("c=biws,r=rOprNGfwEbeRWgbNEkqOsrvnonce,p="));

        // What a server holding the same password would answer
        let salt = STANDARD.decode("W22ZaJ0SNY7soEsUEjb6gQ==").unwrap();
        let mut salted = [0u8; 32];
        pbkdf2_hmac::<Sha256>(b"pencil", &salt, 4096, &mut salted);
        let server_key = hmac_sha256(&salted, b"Server Key").unwrap();
        let auth_message = format!(
            "n=,r=rOprNGfwEbeRWgbNEkqO,{server_first},c=biws,r=rOprNGfwEbeRWgbNEkqOsrvnonce"
        );
        let signature = hmac_sha256(&server_key, auth_message.as_bytes()).unwrap();

        assert!(client.verify_server_final("v=AAAA").is_err());
        client
            .verify_server_final(&format!("v={}", STANDARD.encode(signature)))
            .unwrap();
        // A verified exchange does not accept another signature
        assert!(client.verify_server_final("v=AAAA").is_err());
    }

    #[test]
    fn test_scram_server_error() {
        let mut client = ScramClient::with_nonce("pw", "abc");
        client
            .client_final_message("r=abcdef,s=QSXCR+Q6sek8bf92,i=16")
            .unwrap();
        match client.verify_server_final("e=invalid-proof") {
            Err(Error::Auth(message)) => assert!(message.contains("invalid-proof")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
