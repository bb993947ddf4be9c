use serde::{Deserialize, Serialize};

/// Scroll position of the rendered grid, in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub top: u32,
    pub left: u32,
}

/// The rendering surface a silent refresh must leave where it was
pub trait ScrollSurface: Send {
    fn scroll_offset(&self) -> ScrollOffset;
    fn restore_scroll(&mut self, offset: ScrollOffset);
}

/// Surface for an engine with nothing rendered
#[derive(Debug, Default)]
pub struct DetachedView;

impl ScrollSurface for DetachedView {
    fn scroll_offset(&self) -> ScrollOffset {
        ScrollOffset::default()
    }

    fn restore_scroll(&mut self, _offset: ScrollOffset) {}
}
