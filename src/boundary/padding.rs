use super::{CutWindow, Edge, RequestWindow};

pub(crate) fn start_edge(raw_start: f64, pad_start: f64) -> Edge {
    Edge::before(raw_start, pad_start)
}

pub(crate) fn end_edge(raw_end: f64, pad_end: f64) -> Edge {
    Edge::after(raw_end, pad_end)
}

/// Loose cut: widen the raw window by fixed pads, start clamped at zero
pub fn resolve(request: RequestWindow, pad_start: f64, pad_end: f64) -> CutWindow {
    CutWindow::from_edges(start_edge(request.start, pad_start), end_edge(request.end, pad_end))
}
