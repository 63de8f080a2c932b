use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single document to convert: read `input`, write the PDF to `output`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    input: PathBuf,
    output: PathBuf,
}

impl ConversionJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Base filename of the input, used as the remote object name
    pub fn file_name(&self) -> Option<Cow<'_, str>> {
        self.input.file_name().map(|name| name.to_string_lossy())
    }
}

impl fmt::Display for ConversionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.input.display(), self.output.display())
    }
}

/// JobEnvelope wraps a ConversionJob with its intake sequence number
#[derive(Debug, Clone)]
pub struct JobEnvelope {
    pub seq: u64,
    pub job: ConversionJob,
}
