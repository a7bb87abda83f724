use std::fmt;

/// The coarse error classification carried by a failure notification.
/// Every crate below this one maps its own `thiserror` error enum into one
/// of these kinds at the point it crosses into `import-pipeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    UnrecognizedFormat,
    DecodeFailed,
    IoFailed,
    OutOfMemory,
    Timeout,
    InvalidData,
    NoMatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::UnrecognizedFormat => "unrecognized_format",
            ErrorKind::DecodeFailed => "decode_failed",
            ErrorKind::IoFailed => "io_failed",
            ErrorKind::OutOfMemory => "out_of_memory",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidData => "invalid_data",
            ErrorKind::NoMatch => "no_match",
        };
        f.write_str(s)
    }
}
