use uxr_types::AudioFrame;

/// Fixed-size capture buffer.
///
/// Sample blocks of any length go in; a frame comes out each time the buffer
/// fills. A partially filled buffer is never emitted.
#[derive(Debug)]
pub struct FrameAccumulator {
    frame_samples: usize,
    pending: Vec<f32>,
}

impl FrameAccumulator {
    pub fn new(frame_samples: usize) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
        }
    }

    /// Appends `block` and returns every frame completed by it, in order.
    pub fn push(&mut self, block: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        let mut rest = block;
        while !rest.is_empty() {
            let room = self.frame_samples - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.frame_samples {
                frames.push(AudioFrame::from_samples(&self.pending));
                self.pending.clear();
            }
        }
        frames
    }

    /// Samples waiting for the buffer to fill.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drops the incomplete buffer.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_full_frames() {
        let mut acc = FrameAccumulator::new(4);
        assert!(acc.push(&[0.1, 0.2, 0.3]).is_empty());
        assert_eq!(acc.pending(), 3);

        let frames = acc.push(&[0.4, 0.5]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sample_count(), 4);
        assert_eq!(acc.pending(), 1);
    }

    #[test]
    fn large_block_yields_several_frames_in_order() {
        let mut acc = FrameAccumulator::new(2);
        let frames = acc.push(&[1.0, 1.0, -1.0, -1.0, 0.0, 0.0, 0.5]);
        let decoded: Vec<Vec<i16>> = frames.iter().map(AudioFrame::samples).collect();
        assert_eq!(
            decoded,
            vec![
                vec![i16::MAX, i16::MAX],
                vec![i16::MIN, i16::MIN],
                vec![0, 0]
            ]
        );
        assert_eq!(acc.pending(), 1);
    }

    #[test]
    fn reset_discards_partial_buffer() {
        let mut acc = FrameAccumulator::new(8);
        acc.push(&[0.0; 5]);
        acc.reset();
        assert_eq!(acc.pending(), 0);
        assert!(acc.push(&[0.0; 7]).is_empty());
    }
}
