//! SQLSTATE classification.
//!
//! Server errors are mapped onto a fixed hierarchy of [`ErrorKind`]s so that
//! callers can match on any level of it: `UniqueViolation` is an
//! `IntegrityConstraintViolation`, which is an `SqlError`, which is a `Failure`.

/// Kind of a database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Root of the hierarchy.
    Failure,
    /// The connection could not be established or was lost.
    BrokenConnection,
    /// Server refused the connection because it has too many clients.
    TooManyConnections,
    /// Outcome of a COMMIT is unknown.
    InDoubt,
    /// Generic SQL error.
    SqlError,
    FeatureNotSupported,
    DataException,
    IntegrityConstraintViolation,
    RestrictViolation,
    NotNullViolation,
    ForeignKeyViolation,
    UniqueViolation,
    CheckViolation,
    InvalidCursorState,
    InvalidSqlStatementName,
    InvalidCursorName,
    /// Syntax error; the server reports the offending position.
    SyntaxError,
    UndefinedColumn,
    UndefinedFunction,
    UndefinedTable,
    InsufficientPrivilege,
    InsufficientResources,
    DiskFull,
    OutOfMemory,
    /// Error raised inside a PL/pgSQL function.
    PlpgsqlError,
    PlpgsqlRaise,
    PlpgsqlNoDataFound,
    PlpgsqlTooManyRows,
}

impl ErrorKind {
    /// The next more general kind, or `None` for [`ErrorKind::Failure`].
    pub fn parent(self) -> Option<ErrorKind> {
        use ErrorKind::*;
        match self {
            Failure => None,
            BrokenConnection | SqlError | InDoubt => Some(Failure),
            TooManyConnections => Some(BrokenConnection),
            FeatureNotSupported
            | DataException
            | IntegrityConstraintViolation
            | InvalidCursorState
            | InvalidSqlStatementName
            | InvalidCursorName
            | SyntaxError
            | InsufficientPrivilege
            | InsufficientResources
            | PlpgsqlError => Some(SqlError),
            RestrictViolation | NotNullViolation | ForeignKeyViolation | UniqueViolation
            | CheckViolation => Some(IntegrityConstraintViolation),
            UndefinedColumn | UndefinedFunction | UndefinedTable => Some(SyntaxError),
            DiskFull | OutOfMemory => Some(InsufficientResources),
            PlpgsqlRaise | PlpgsqlNoDataFound | PlpgsqlTooManyRows => Some(PlpgsqlError),
        }
    }

    /// Returns true if `self` is `ancestor` or one of its descendants.
    pub fn is_a(self, ancestor: ErrorKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Human-readable snake_case name.
    pub fn name(self) -> &'static str {
        use ErrorKind::*;
        match self {
            Failure => "failure",
            BrokenConnection => "broken_connection",
            TooManyConnections => "too_many_connections",
            InDoubt => "in_doubt_error",
            SqlError => "sql_error",
            FeatureNotSupported => "feature_not_supported",
            DataException => "data_exception",
            IntegrityConstraintViolation => "integrity_constraint_violation",
            RestrictViolation => "restrict_violation",
            NotNullViolation => "not_null_violation",
            ForeignKeyViolation => "foreign_key_violation",
            UniqueViolation => "unique_violation",
            CheckViolation => "check_violation",
            InvalidCursorState => "invalid_cursor_state",
            InvalidSqlStatementName => "invalid_sql_statement_name",
            InvalidCursorName => "invalid_cursor_name",
            SyntaxError => "syntax_error",
            UndefinedColumn => "undefined_column",
            UndefinedFunction => "undefined_function",
            UndefinedTable => "undefined_table",
            InsufficientPrivilege => "insufficient_privilege",
            InsufficientResources => "insufficient_resources",
            DiskFull => "disk_full",
            OutOfMemory => "out_of_memory",
            PlpgsqlError => "plpgsql_error",
            PlpgsqlRaise => "plpgsql_raise",
            PlpgsqlNoDataFound => "plpgsql_no_data_found",
            PlpgsqlTooManyRows => "plpgsql_too_many_rows",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a SQLSTATE code to an [`ErrorKind`].
///
/// Exact codes are checked before their class. Unknown or empty codes map to
/// [`ErrorKind::SqlError`].
pub fn classify(sqlstate: &str) -> ErrorKind {
    use ErrorKind::*;
    match sqlstate {
        "23001" => return RestrictViolation,
        "23502" => return NotNullViolation,
        "23503" => return ForeignKeyViolation,
        "23505" => return UniqueViolation,
        "23514" => return CheckViolation,
        "42501" => return InsufficientPrivilege,
        "42601" => return SyntaxError,
        "42703" => return UndefinedColumn,
        "42883" => return UndefinedFunction,
        "42P01" => return UndefinedTable,
        "53100" => return DiskFull,
        "53200" => return OutOfMemory,
        "53300" => return TooManyConnections,
        "P0001" => return PlpgsqlRaise,
        "P0002" => return PlpgsqlNoDataFound,
        "P0003" => return PlpgsqlTooManyRows,
        _ => {}
    }

    match sqlstate.get(..2) {
        Some("08") => BrokenConnection,
        Some("0A") => FeatureNotSupported,
        Some("22") => DataException,
        Some("23") => IntegrityConstraintViolation,
        Some("24") => InvalidCursorState,
        Some("26") => InvalidSqlStatementName,
        Some("34") => InvalidCursorName,
        Some("53") => InsufficientResources,
        Some("P0") => PlpgsqlError,
        _ => SqlError,
    }
}
