//! Identifiers shared by the protocol, the driver and result metadata.

/// Object identifier of a server data type.
pub type Oid = u32;

/// Type OIDs of the built-in types this connector binds and decodes.
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const VARCHAR: Oid = 1043;
    pub const DATE: Oid = 1082;
    pub const TIME: Oid = 1083;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const NUMERIC: Oid = 1700;
    pub const UUID: Oid = 2950;
}

/// Session transaction state reported with every ReadyForQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// Outside a transaction block
    #[default]
    Idle,
    /// Inside a transaction block
    InTransaction,
    /// Inside a failed transaction block; only ROLLBACK is accepted
    Failed,
}

impl TransactionStatus {
    /// Decode the status byte of ReadyForQuery.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Returns true inside a transaction block, failed or not.
    pub fn in_transaction(self) -> bool {
        self != TransactionStatus::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_byte() {
        assert_eq!(
            TransactionStatus::from_byte(b'E'),
            Some(TransactionStatus::Failed)
        );
        assert!(TransactionStatus::Failed.in_transaction());
        assert!(!TransactionStatus::Idle.in_transaction());
        assert_eq!(TransactionStatus::from_byte(b'?'), None);
    }
}
