//! Ping-pong bookkeeping for post-process passes.
//!
//! After the scene pass the resolved image sits in the intermediate target.
//! Each post pass reads the target written last and writes the other one,
//! so after `n` passes the frame lives in the intermediate target when `n`
//! is even and in the final target when it is odd.

use glam::Vec4;

use crate::backend::{ProgramKind, Uniform};

/// Which single-sample target holds the most recently written image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PingPong {
    #[default]
    Intermediate,
    Final,
}

impl PingPong {
    /// The target the next pass reads from.
    pub fn source(self) -> PingPong {
        self
    }

    /// The target the next pass writes to.
    pub fn destination(self) -> PingPong {
        self.flipped()
    }

    pub fn flipped(self) -> PingPong {
        match self {
            PingPong::Intermediate => PingPong::Final,
            PingPong::Final => PingPong::Intermediate,
        }
    }

    fn index(self) -> usize {
        match self {
            PingPong::Intermediate => 0,
            PingPong::Final => 1,
        }
    }
}

/// The intermediate and final targets, indexed by [`PingPong`].
pub struct PostTargets<T> {
    targets: [T; 2],
}

impl<T> PostTargets<T> {
    pub fn new(intermediate: T, final_target: T) -> Self {
        Self {
            targets: [intermediate, final_target],
        }
    }

    pub fn get(&self, which: PingPong) -> &T {
        &self.targets[which.index()]
    }

    pub fn intermediate(&self) -> &T {
        self.get(PingPong::Intermediate)
    }

    pub fn final_target(&self) -> &T {
        self.get(PingPong::Final)
    }

    /// `(source, destination)` for a pass starting in `state`.
    pub fn pair(&self, state: PingPong) -> (&T, &T) {
        (self.get(state.source()), self.get(state.destination()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.targets.iter_mut()
    }
}

/// A full-screen pass applied to the composed frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PostEffect {
    /// Multiplies every pixel by a color.
    ColorGrade(Vec4),
    /// Replaces rgb with `1 - rgb`.
    Invert,
}

impl PostEffect {
    pub fn program(&self) -> ProgramKind {
        match self {
            PostEffect::ColorGrade(_) => ProgramKind::ColorGrade,
            PostEffect::Invert => ProgramKind::InvertColor,
        }
    }

    /// Uniforms beyond the source frame sampler.
    pub fn uniforms(&self) -> Option<(&'static str, Uniform)> {
        match self {
            PostEffect::ColorGrade(color) => Some(("u_GradingColor", Uniform::Float4(*color))),
            PostEffect::Invert => None,
        }
    }
}
