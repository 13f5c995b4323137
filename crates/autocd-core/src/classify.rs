//! Severity classification of script output lines.

use serde::{Deserialize, Serialize};

/// Severity a captured output line is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Info,
    Error,
}

/// Decides the severity of a single output line.
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> LineLevel;
}

impl<F> LineClassifier for F
where
    F: Fn(&str) -> LineLevel + Send + Sync,
{
    fn classify(&self, line: &str) -> LineLevel {
        self(line)
    }
}

/// Tags a line as an error when it contains any of a list of keywords.
/// Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub const DEFAULT_KEYWORDS: &'static [&'static str] =
        &["error:", "fatal:", "failed", "错误", "失败"];

    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_KEYWORDS)
    }
}

impl LineClassifier for KeywordClassifier {
    fn classify(&self, line: &str) -> LineLevel {
        let lower = line.to_lowercase();
        if self.keywords.iter().any(|k| lower.contains(k.as_str())) {
            LineLevel::Error
        } else {
            LineLevel::Info
        }
    }
}
