/// Planar multi-channel sample buffer with its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length in sample frames (shortest channel).
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f32 / self.sample_rate as f32
    }

    pub fn seconds_to_samples(&self, seconds: f32) -> usize {
        (seconds.max(0.0) * self.sample_rate as f32).round() as usize
    }

    /// Copy of sample frames `start..end`, clamped to the buffer.
    pub fn slice(&self, start: usize, end: usize) -> AudioBuffer {
        let len = self.len();
        let end = end.min(len);
        let start = start.min(end);
        let channels = self
            .channels
            .iter()
            .map(|ch| ch[start..end].to_vec())
            .collect();
        AudioBuffer::new(channels, self.sample_rate)
    }

    /// Average of all channels.
    pub fn mixdown(&self) -> Vec<f32> {
        let len = self.len();
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0][..len].to_vec(),
            n => (0..len)
                .map(|i| self.channels.iter().map(|ch| ch[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}
