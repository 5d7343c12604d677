use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtectionError {
    #[error("Invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Mask character {0:?} is not printable")]
    InvalidMaskChar(char),

    #[error("Metadata nested deeper than {max_depth} levels")]
    NestingTooDeep { max_depth: usize },
}
