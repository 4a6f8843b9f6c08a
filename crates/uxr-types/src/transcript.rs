/// Accumulated final transcript of one session.
///
/// Append-only: each final text is added in arrival order followed by a
/// separating space. Readers get the trimmed concatenation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalTranscript {
    buf: String,
    segments: usize,
}

impl FinalTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        self.buf.push(' ');
        self.segments += 1;
    }

    /// Number of final segments received.
    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }

    pub fn text(&self) -> &str {
        self.buf.trim()
    }

    pub fn into_text(self) -> String {
        self.text().to_string()
    }
}
