//! Input contract with the upstream recognizer.
//!
//! The recognizer decodes audio and hands over, per frame, the feature
//! vector and the Gaussian posteriors of the senones its tokens visited.

/// Posterior mass assigned to one Gaussian component of one senone at one
/// frame. The dense Gaussian id is `senone * numGaussiansPerState + component`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPosterior {
    pub senone: usize,
    pub component: usize,
    pub posterior: f32,
}

/// One decoded frame: the observed feature vector plus the per-Gaussian
/// posteriors active at that frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameScores {
    pub feature: Vec<f32>,
    pub posteriors: Vec<GaussianPosterior>,
}

/// One decoded utterance, flattened to its frame timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedResult {
    pub frames: Vec<FrameScores>,
}

impl DecodedResult {
    pub fn new(frames: Vec<FrameScores>) -> Self {
        DecodedResult { frames }
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }
}
