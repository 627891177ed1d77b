// Sample-rate conversion, downmixing and fixed-size framing
//
// Everything here runs inside device callbacks, so it is allocation-light
// and never blocks.

/// Average interleaved channels down to mono
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    let channels = channels as usize;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Streaming linear-interpolation resampler for a mono signal
///
/// Keeps its phase and the last input sample between calls so
/// consecutive device buffers join without clicks.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    /// Input samples advanced per output sample
    step: f64,
    /// Fractional read position relative to `last`
    position: f64,
    last: Option<f32>,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            step: from_rate as f64 / to_rate.max(1) as f64,
            position: 0.0,
            last: None,
        }
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// Resample the next chunk of input
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() || input.is_empty() {
            return input.to_vec();
        }

        // Index -1 is the carried-over sample from the previous call
        let prev = self.last.unwrap_or(input[0]);
        let at = |i: isize| -> f32 {
            if i < 0 {
                prev
            } else {
                input[i as usize]
            }
        };

        let capacity = (input.len() as f64 / self.step).ceil() as usize + 1;
        let mut out = Vec::with_capacity(capacity);

        // position is measured from the carried sample (index -1)
        while self.position < input.len() as f64 {
            let base = self.position.floor();
            let frac = (self.position - base) as f32;
            let i = base as isize - 1;
            let a = at(i);
            let b = at(i + 1);
            out.push(a + (b - a) * frac);
            self.position += self.step;
        }

        self.position -= input.len() as f64;
        self.last = input.last().copied();
        out
    }
}

/// One-shot resample of a whole buffer
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    LinearResampler::new(from_rate, to_rate).process(input)
}

/// Accumulates samples and emits fixed-size blocks
///
/// Holds at most one partial block.
#[derive(Debug, Clone)]
pub struct BlockFramer {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples waiting for the next block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed samples, returning every block they complete
    pub fn push(&mut self, mut samples: &[f32]) -> Vec<Vec<f32>> {
        let mut blocks = Vec::new();

        while !samples.is_empty() {
            let room = self.block_size - self.pending.len();
            let take = room.min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == self.block_size {
                let block = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                blocks.push(block);
            }
        }

        blocks
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
