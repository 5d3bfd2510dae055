//! The shared error type of the engine.
//!
//! Errors are typed kinds, not string messages. Callers match on
//! [`Error::kind`] while the payload carries whatever diagnostic the failing
//! layer had at hand.
use core::fmt;
use std::error;

use crate::buffer::PixelFormat;

pub type Result<T> = core::result::Result<T, Error>;

/// Classifies an [`Error`] without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A parameter outside its permitted domain.
    InvalidArgument,
    /// A filter received an unsupported (element, layout) pair.
    LayoutMismatch,
    /// Operand dimensions are incompatible.
    ShapeMismatch,
    /// Decode/encode requested for an unknown codec identifier.
    UnsupportedCodec,
    /// The codec layer itself failed.
    CodecFailure,
    /// A graph failed validation: cycle, unbound port, duplicate binding,
    /// or a type-incompatible connection.
    GraphInvalid,
    /// Execution was cancelled by token.
    Cancelled,
    /// Allocation failed or a configured limit was exceeded.
    ResourceExhausted,
}

#[derive(Debug)]
pub struct Error {
    repr: Repr,
}

#[derive(Debug)]
enum Repr {
    InvalidArgument {
        /// The parameter or production at fault.
        what: &'static str,
        detail: String,
    },
    LayoutMismatch {
        found: PixelFormat,
        /// Formats the operation would have accepted.
        expected: Vec<PixelFormat>,
    },
    ShapeMismatch {
        left: (u32, u32),
        right: (u32, u32),
        what: &'static str,
    },
    UnsupportedCodec(String),
    CodecFailure(image::ImageError),
    GraphInvalid(String),
    Cancelled,
    ResourceExhausted(&'static str),
    /// A same-kind stand-in for an error that already surfaced elsewhere,
    /// e.g. one failing node feeding several sinks.
    Propagated { kind: ErrorKind, detail: String },
}

impl Error {
    pub(crate) fn invalid_argument(what: &'static str, detail: impl Into<String>) -> Self {
        Error {
            repr: Repr::InvalidArgument {
                what,
                detail: detail.into(),
            },
        }
    }

    pub(crate) fn layout_mismatch(found: PixelFormat, expected: &[PixelFormat]) -> Self {
        Error {
            repr: Repr::LayoutMismatch {
                found,
                expected: expected.to_vec(),
            },
        }
    }

    pub(crate) fn shape_mismatch(what: &'static str, left: (u32, u32), right: (u32, u32)) -> Self {
        Error {
            repr: Repr::ShapeMismatch { left, right, what },
        }
    }

    pub(crate) fn unsupported_codec(id: impl Into<String>) -> Self {
        Error {
            repr: Repr::UnsupportedCodec(id.into()),
        }
    }

    pub(crate) fn codec(err: image::ImageError) -> Self {
        Error {
            repr: Repr::CodecFailure(err),
        }
    }

    pub(crate) fn graph(detail: impl Into<String>) -> Self {
        Error {
            repr: Repr::GraphInvalid(detail.into()),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Error {
            repr: Repr::Cancelled,
        }
    }

    pub(crate) fn exhausted(what: &'static str) -> Self {
        Error {
            repr: Repr::ResourceExhausted(what),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            Repr::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Repr::LayoutMismatch { .. } => ErrorKind::LayoutMismatch,
            Repr::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Repr::UnsupportedCodec(_) => ErrorKind::UnsupportedCodec,
            Repr::CodecFailure(_) => ErrorKind::CodecFailure,
            Repr::GraphInvalid(_) => ErrorKind::GraphInvalid,
            Repr::Cancelled => ErrorKind::Cancelled,
            Repr::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Repr::Propagated { kind, .. } => *kind,
        }
    }

    /// A cheap same-kind duplicate, for reporting one originating failure
    /// at several places.
    pub(crate) fn duplicate(&self) -> Error {
        Error {
            repr: Repr::Propagated {
                kind: self.kind(),
                detail: self.to_string(),
            },
        }
    }

    /// The codec diagnostic, when this is a `CodecFailure`.
    pub fn codec_diagnostic(&self) -> Option<&image::ImageError> {
        match &self.repr {
            Repr::CodecFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::InvalidArgument { what, detail } => {
                write!(f, "invalid argument `{}`: {}", what, detail)
            }
            Repr::LayoutMismatch { found, expected } => {
                write!(f, "unsupported pixel format {:?}, expected one of {:?}", found, expected)
            }
            Repr::ShapeMismatch { left, right, what } => write!(
                f,
                "incompatible dimensions for {}: {}x{} vs {}x{}",
                what, left.0, left.1, right.0, right.1
            ),
            Repr::UnsupportedCodec(id) => write!(f, "unknown codec `{}`", id),
            Repr::CodecFailure(err) => write!(f, "codec failure: {}", err),
            Repr::GraphInvalid(detail) => write!(f, "invalid graph: {}", detail),
            Repr::Cancelled => write!(f, "execution cancelled"),
            Repr::ResourceExhausted(what) => write!(f, "resource exhausted: {}", what),
            Repr::Propagated { detail, .. } => f.write_str(detail),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            Repr::CodecFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::codec(err)
    }
}
