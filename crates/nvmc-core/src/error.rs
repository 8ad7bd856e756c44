//! The single error type produced by this crate.
//!
//! Matches the source policy: one recoverable error, first-failure-wins.
//! Once a `Codegen` has recorded an error, every emission entry point
//! becomes a no-op so the first failure is the one that is reported.

use std::borrow::Cow;
use std::fmt;

use crate::model::CodePosition;

/// Coarse classification of why compilation failed.
///
/// See the module design notes for the intent behind each kind: `Structural`
/// errors are unsupported source constructs, `Capacity` errors are hard
/// limits of the bytecode encoding, `Resolution` errors are unknown names or
/// malformed constants, and `Semantic` errors are type/shape mismatches the
/// front end should have caught but this crate double-checks at emission
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    Structural,
    Capacity,
    Resolution,
    Semantic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Structural => "structural",
            Self::Capacity => "capacity",
            Self::Resolution => "resolution",
            Self::Semantic => "semantic",
        };
        f.write_str(s)
    }
}

/// A single compile error: a human-readable message, its kind, and the
/// source position it was detected at, when one is known.
///
/// Some `Structural` errors are detected without a specific AST node in
/// hand (e.g. during the resolve pass); `position` is `None` in that case
/// and callers should fall back to the last recorded sequence point.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: Cow<'static, str>,
    pub position: Option<CodePosition>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>, position: Option<CodePosition>) -> Self {
        Self {
            kind,
            message: message.into(),
            position,
        }
    }

    pub fn structural(message: impl Into<Cow<'static, str>>, position: Option<CodePosition>) -> Self {
        Self::new(ErrorKind::Structural, message, position)
    }

    pub fn capacity(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Capacity, message, None)
    }

    pub fn resolution(message: impl Into<Cow<'static, str>>, position: Option<CodePosition>) -> Self {
        Self::new(ErrorKind::Resolution, message, position)
    }

    pub fn semantic(message: impl Into<Cow<'static, str>>, position: Option<CodePosition>) -> Self {
        Self::new(ErrorKind::Semantic, message, position)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(pos) => write!(f, "{} error at {pos}: {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;
