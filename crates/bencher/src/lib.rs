//! Shared inputs for the parser benchmarks.

/// A raw message read from `resources/`.
#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn bytes(&self) -> &'static [u8] {
        self.content.as_bytes()
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

/// How the input is handed to the parser.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Feed {
    /// The whole message in one slice
    Whole,
    /// Slices of at most this many bytes, as small socket reads would deliver them
    Segments(usize),
}

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    file: TestFile,
    feed: Feed,
}

impl TestCase {
    pub fn new(name: &'static str, file: TestFile, feed: Feed) -> Self {
        Self { name, file, feed }
    }

    pub fn whole(name: &'static str, file: TestFile) -> Self {
        Self::new(name, file, Feed::Whole)
    }

    pub fn segmented(name: &'static str, file: TestFile, segment_size: usize) -> Self {
        Self::new(name, file, Feed::Segments(segment_size))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    /// The input split the way this case feeds it.
    pub fn segments(&self) -> Vec<&'static [u8]> {
        let bytes = self.file.bytes();
        match self.feed {
            Feed::Whole => vec![bytes],
            Feed::Segments(size) => bytes.chunks(size.max(1)).collect(),
        }
    }
}
