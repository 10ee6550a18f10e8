use crate::job::JobId;

pub const DEFAULT_ID_PREFIX: &str = "fakej0bqee";
pub const DEFAULT_ID_WIDTH: usize = 15;

/// Hands out job ids from a counter that starts at 1 and never goes back.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
    width: usize,
    next: u64,
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
            next: 1,
        }
    }

    pub fn next_id(&mut self) -> JobId {
        let id = self.render(self.next);
        self.next += 1;
        id
    }

    /// Number of ids issued so far.
    pub fn issued(&self) -> u64 {
        self.next - 1
    }

    fn render(&self, value: u64) -> JobId {
        JobId::new(format!(
            "{}{:0width$}",
            self.prefix,
            value,
            width = self.width
        ))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_PREFIX, DEFAULT_ID_WIDTH)
    }
}
