use std::time::Duration;

/// Connection settings.
///
/// ```
/// use std::time::Duration;
/// use strand_ws::Config;
///
/// let config = Config::new().with_buffer_size(4096).with_read_timeout(Duration::from_secs(30));
/// assert_eq!(config.buffer_size(), 4096);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    buffer_size: usize,
    read_timeout: Option<Duration>,
    max_message_size: u64,
}

impl Config {
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;
    pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 16 << 20;
    const MIN_BUFFER_SIZE: usize = 4;

    pub fn new() -> Self {
        Self {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            read_timeout: None,
            max_message_size: Self::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Outbound bytes buffered before a frame is pushed, and the granularity
    /// of transport reads. Raised to at least 4 so any UTF-8 sequence fits.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(Self::MIN_BUFFER_SIZE);
        self
    }

    /// A read that takes longer closes the connection with 1001.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Upper bound for messages reassembled by `read_message`.
    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: u64) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn max_message_size(&self) -> u64 {
        self.max_message_size
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
