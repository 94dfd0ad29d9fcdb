use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserMetrics {
    pub browsers_launched: u64,
    pub sessions_acquired: u64,
    pub sessions_released: u64,
    pub pages_opened: u64,
    pub scroll_cycles: u64,
    pub posts_extracted: u64,
}

impl BrowserMetrics {
    pub fn record_launch(&mut self) {
        self.browsers_launched = self.browsers_launched.saturating_add(1);
    }

    pub fn record_session_acquired(&mut self) {
        self.sessions_acquired = self.sessions_acquired.saturating_add(1);
    }

    pub fn record_session_released(&mut self) {
        self.sessions_released = self.sessions_released.saturating_add(1);
    }

    pub fn record_page_open(&mut self) {
        self.pages_opened = self.pages_opened.saturating_add(1);
    }

    pub fn record_scroll(&mut self) {
        self.scroll_cycles = self.scroll_cycles.saturating_add(1);
    }

    pub fn record_posts(&mut self, count: u64) {
        self.posts_extracted = self.posts_extracted.saturating_add(count);
    }

    pub fn open_sessions(&self) -> u64 {
        self.sessions_acquired.saturating_sub(self.sessions_released)
    }
}
