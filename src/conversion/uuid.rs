//! UUID type implementation.

use chrono::FixedOffset;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::{FromText, ToParam};

impl ToParam for Uuid {
    fn to_param(&self, buf: &mut String, _local_offset: FixedOffset) {
        buf.push_str(self.hyphenated().encode_lower(&mut Uuid::encode_buffer()));
    }
}

impl FromText<'_> for Uuid {
    fn value_for_null() -> Self {
        Uuid::nil()
    }

    fn from_text(bytes: &[u8]) -> Result<Self> {
        Uuid::try_parse_ascii(bytes).map_err(|e| Error::Decode(format!("invalid UUID: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::to_param_string;

    #[test]
    fn test_uuid_param_is_lower_hyphenated() {
        let id = Uuid::from_u128(0x550E8400_E29B_41D4_A716_446655440000);
        assert_eq!(
            to_param_string(&id, FixedOffset::east_opt(0).unwrap()),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_uuid_from_text() {
        let id = Uuid::from_text(b"550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.as_u128(), 0x550E8400_E29B_41D4_A716_446655440000);
        assert!(matches!(Uuid::from_text(b"not-a-uuid"), Err(Error::Decode(_))));
        assert!(Uuid::value_for_null().is_nil());
    }
}
