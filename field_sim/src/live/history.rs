use crate::tags::structures::HistoricalPoint;
use heapless::HistoryBuffer;
use std::collections::HashMap;
use std::fmt;

/// Points kept for the compact sparkline trace.
pub const SPARKLINE_CAPACITY: usize = 50;
/// Points kept for the full history chart.
pub const HISTORY_CAPACITY: usize = 100;

/// Fixed-capacity FIFO of points; the oldest point is overwritten when full.
pub struct PointRing<const N: usize> {
    buf: HistoryBuffer<HistoricalPoint, N>,
}

impl<const N: usize> PointRing<N> {
    pub fn new() -> Self {
        PointRing {
            buf: HistoryBuffer::new(),
        }
    }

    pub fn push(&mut self, point: HistoricalPoint) {
        self.buf.write(point);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn latest(&self) -> Option<&HistoricalPoint> {
        self.buf.recent()
    }

    /// Points oldest first.
    pub fn points(&self) -> Vec<HistoricalPoint> {
        self.buf.oldest_ordered().copied().collect()
    }
}

impl<const N: usize> Default for PointRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for PointRing<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointRing")
            .field("len", &self.len())
            .field("capacity", &N)
            .finish()
    }
}

pub type Sparkline = PointRing<SPARKLINE_CAPACITY>;
pub type History = PointRing<HISTORY_CAPACITY>;

/// Sparkline and history rings keyed by tag id.
#[derive(Debug, Default)]
pub struct TagHistories {
    sparklines: HashMap<String, Sparkline>,
    history: HashMap<String, History>,
}

impl TagHistories {
    pub fn record(&mut self, tag_id: &str, point: HistoricalPoint) {
        self.sparklines.entry(tag_id.to_string()).or_default().push(point);
        self.history.entry(tag_id.to_string()).or_default().push(point);
    }

    pub fn sparkline(&self, tag_id: &str) -> Vec<HistoricalPoint> {
        self.sparklines.get(tag_id).map(PointRing::points).unwrap_or_default()
    }

    pub fn history(&self, tag_id: &str) -> Vec<HistoricalPoint> {
        self.history.get(tag_id).map(PointRing::points).unwrap_or_default()
    }

    pub fn sparklines(&self) -> impl Iterator<Item = (&String, &Sparkline)> {
        self.sparklines.iter()
    }

    pub fn histories(&self) -> impl Iterator<Item = (&String, &History)> {
        self.history.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.sparklines.is_empty() && self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.sparklines.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(i: u64) -> HistoricalPoint {
        HistoricalPoint {
            value: i as f64,
            timestamp: 1_000 + i,
        }
    }

    #[test]
    fn sixty_points_leave_the_last_fifty() {
        let mut ring = Sparkline::new();
        for i in 0..60 {
            ring.push(point(i));
        }
        let points = ring.points();
        assert_eq!(points.len(), SPARKLINE_CAPACITY);
        assert_eq!(points.first().unwrap().value, 10.0);
        assert_eq!(points.last().unwrap().value, 59.0);
        assert_eq!(ring.latest().unwrap().value, 59.0);
    }

    #[test]
    fn history_keeps_twice_the_sparkline() {
        let mut histories = TagHistories::default();
        for i in 0..150 {
            histories.record("T1", point(i));
        }
        assert_eq!(histories.sparkline("T1").len(), SPARKLINE_CAPACITY);
        assert_eq!(histories.history("T1").len(), HISTORY_CAPACITY);
        assert_eq!(histories.history("T1")[0].value, 50.0);
        assert!(histories.sparkline("missing").is_empty());
    }
}
