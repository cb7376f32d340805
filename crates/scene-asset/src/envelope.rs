//! Scalar keyframe envelopes driving one transform component each.

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::{
    animation::{AnimationKeyFrame, Interpolate, NodeAnimation},
    node::DecomposedTransform,
};

/// Extrapolation before the first or after the last key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrePostBehaviour {
    Reset,
    #[default]
    Constant,
    Repeat,
    Oscillate,
    OffsetRepeat,
    Linear,
}

impl PrePostBehaviour {
    pub fn from_index(index: u32) -> Self {
        match index {
            0 => PrePostBehaviour::Reset,
            2 => PrePostBehaviour::Repeat,
            3 => PrePostBehaviour::Oscillate,
            4 => PrePostBehaviour::OffsetRepeat,
            5 => PrePostBehaviour::Linear,
            _ => PrePostBehaviour::Constant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeChannel {
    PositionX,
    PositionY,
    PositionZ,
    Heading,
    Pitch,
    Bank,
    ScaleX,
    ScaleY,
    ScaleZ,
    Other(u32),
}

impl EnvelopeChannel {
    /// Maps the zero based channel index used by scene files.
    pub fn from_index(index: u32) -> Self {
        match index {
            0 => EnvelopeChannel::PositionX,
            1 => EnvelopeChannel::PositionY,
            2 => EnvelopeChannel::PositionZ,
            3 => EnvelopeChannel::Heading,
            4 => EnvelopeChannel::Pitch,
            5 => EnvelopeChannel::Bank,
            6 => EnvelopeChannel::ScaleX,
            7 => EnvelopeChannel::ScaleY,
            8 => EnvelopeChannel::ScaleZ,
            other => EnvelopeChannel::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyInterpolation {
    #[default]
    Tcb,
    Hermite,
    Linear,
    Step,
    Bezier,
}

impl KeyInterpolation {
    /// Interpolation of a span type, with the number of parameters it carries.
    pub fn from_span(span: u32) -> Option<(Self, usize)> {
        match span {
            0 => Some((KeyInterpolation::Tcb, 5)),
            1 | 2 => Some((KeyInterpolation::Hermite, 5)),
            3 => Some((KeyInterpolation::Linear, 0)),
            4 => Some((KeyInterpolation::Step, 0)),
            5 => Some((KeyInterpolation::Bezier, 4)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeKey {
    /// Time in seconds.
    pub time: f64,
    pub value: f32,
    /// Interpolation of the span ending at this key.
    pub interpolation: KeyInterpolation,
    /// Tension, continuity and bias for TCB keys.
    pub params: [f32; 5],
}

impl EnvelopeKey {
    pub fn new(time: f64, value: f32, interpolation: KeyInterpolation) -> Self {
        Self {
            time,
            value,
            interpolation,
            params: [0.0; 5],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub channel: EnvelopeChannel,
    pub keys: Vec<EnvelopeKey>,
    pub pre: PrePostBehaviour,
    pub post: PrePostBehaviour,
}

impl Envelope {
    pub fn new(channel: EnvelopeChannel) -> Self {
        Self {
            channel,
            keys: Vec::new(),
            pre: PrePostBehaviour::default(),
            post: PrePostBehaviour::default(),
        }
    }

    /// Keys may be declared in any order.
    pub fn sort_keys(&mut self) {
        self.keys.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    pub fn first_value(&self) -> Option<f32> {
        self.keys.first().map(|key| key.value)
    }

    /// Evaluates the envelope; keys must be sorted.
    pub fn value_at(&self, time: f64) -> Option<f32> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;
        if self.keys.len() == 1 {
            return Some(first.value);
        }
        if time < first.time {
            return Some(self.extrapolate(time, self.pre, 0));
        }
        if time > last.time {
            return Some(self.extrapolate(time, self.post, self.keys.len() - 2));
        }
        Some(self.interpolate(time))
    }

    fn extrapolate(&self, time: f64, behaviour: PrePostBehaviour, segment: usize) -> f32 {
        let first = &self.keys[0];
        let last = &self.keys[self.keys.len() - 1];
        match behaviour {
            PrePostBehaviour::Reset => 0.0,
            PrePostBehaviour::Constant => {
                if time < first.time {
                    first.value
                } else {
                    last.value
                }
            }
            PrePostBehaviour::Linear => {
                let a = &self.keys[segment];
                let b = &self.keys[segment + 1];
                let span = b.time - a.time;
                if span <= 0.0 {
                    return a.value;
                }
                let slope = (b.value - a.value) as f64 / span;
                let anchor = if time < first.time { first } else { last };
                (anchor.value as f64 + slope * (time - anchor.time)) as f32
            }
            PrePostBehaviour::Repeat
            | PrePostBehaviour::Oscillate
            | PrePostBehaviour::OffsetRepeat => {
                let span = last.time - first.time;
                if span <= 0.0 {
                    return first.value;
                }
                let cycle = ((time - first.time) / span).floor();
                let mut local = time - first.time - cycle * span;
                if behaviour == PrePostBehaviour::Oscillate && (cycle as i64).rem_euclid(2) != 0 {
                    local = span - local;
                }
                let value = self.interpolate(first.time + local);
                if behaviour == PrePostBehaviour::OffsetRepeat {
                    value + cycle as f32 * (last.value - first.value)
                } else {
                    value
                }
            }
        }
    }

    fn interpolate(&self, time: f64) -> f32 {
        let next = self
            .keys
            .partition_point(|key| key.time <= time)
            .clamp(1, self.keys.len() - 1);
        let index = next - 1;
        let a = &self.keys[index];
        let b = &self.keys[next];
        let span = b.time - a.time;
        if span <= 0.0 {
            return b.value;
        }
        let t = ((time - a.time) / span) as f32;
        match b.interpolation {
            KeyInterpolation::Step => a.value,
            KeyInterpolation::Linear => f32::linear(a.value, b.value, t),
            KeyInterpolation::Tcb | KeyInterpolation::Hermite | KeyInterpolation::Bezier => {
                let (outgoing, incoming) = self.tangents(index);
                f32::cubic_spline(a.value, outgoing, b.value, incoming, t, 1.0)
            }
        }
    }

    /// Kochanek-Bartels tangents of the segment starting at `index`.
    fn tangents(&self, index: usize) -> (f32, f32) {
        let a = &self.keys[index];
        let b = &self.keys[index + 1];
        let delta = b.value - a.value;
        let tcb = |key: &EnvelopeKey| match key.interpolation {
            KeyInterpolation::Tcb => (key.params[0], key.params[1], key.params[2]),
            _ => (0.0, 0.0, 0.0),
        };

        let outgoing = match index.checked_sub(1).map(|previous| &self.keys[previous]) {
            Some(previous) => {
                let (tension, continuity, bias) = tcb(a);
                let scale = 1.0 - tension;
                scale * (1.0 + continuity) * (1.0 + bias) / 2.0 * (a.value - previous.value)
                    + scale * (1.0 - continuity) * (1.0 - bias) / 2.0 * delta
            }
            None => delta,
        };
        let incoming = match self.keys.get(index + 2) {
            Some(next) => {
                let (tension, continuity, bias) = tcb(b);
                let scale = 1.0 - tension;
                scale * (1.0 - continuity) * (1.0 + bias) / 2.0 * delta
                    + scale * (1.0 + continuity) * (1.0 - bias) / 2.0 * (next.value - b.value)
            }
            None => delta,
        };
        (outgoing, incoming)
    }
}

/// Rotation from heading, pitch and bank in radians.
pub fn heading_pitch_bank(heading: f32, pitch: f32, bank: f32) -> Quat {
    Quat::from_euler(EulerRot::YXZ, heading, pitch, bank)
}

/// Combines the envelopes of one node into transforms and animation tracks.
pub struct EnvelopeResolver<'a> {
    envelopes: &'a [Envelope],
}

impl<'a> EnvelopeResolver<'a> {
    pub fn new(envelopes: &'a [Envelope]) -> Self {
        Self { envelopes }
    }

    fn envelope(&self, channel: EnvelopeChannel) -> Option<&'a Envelope> {
        self.envelopes
            .iter()
            .find(|envelope| envelope.channel == channel && !envelope.keys.is_empty())
    }

    fn value_at(&self, channel: EnvelopeChannel, time: f64, default: f32) -> f32 {
        self.envelope(channel)
            .and_then(|envelope| envelope.value_at(time))
            .unwrap_or(default)
    }

    fn first_value(&self, channel: EnvelopeChannel, default: f32) -> f32 {
        self.envelope(channel)
            .and_then(Envelope::first_value)
            .unwrap_or(default)
    }

    pub fn has_keys(&self) -> bool {
        self.envelopes.iter().any(|envelope| !envelope.keys.is_empty())
    }

    /// Transform given by the first key of every channel.
    pub fn bind_pose(&self) -> Mat4 {
        use EnvelopeChannel::*;
        DecomposedTransform {
            translation: Vec3::new(
                self.first_value(PositionX, 0.0),
                self.first_value(PositionY, 0.0),
                self.first_value(PositionZ, 0.0),
            ),
            rotation: heading_pitch_bank(
                self.first_value(Heading, 0.0),
                self.first_value(Pitch, 0.0),
                self.first_value(Bank, 0.0),
            ),
            scale: Vec3::new(
                self.first_value(ScaleX, 1.0),
                self.first_value(ScaleY, 1.0),
                self.first_value(ScaleZ, 1.0),
            ),
        }
        .into()
    }

    pub fn transform_at(&self, time: f64) -> DecomposedTransform {
        use EnvelopeChannel::*;
        DecomposedTransform {
            translation: Vec3::new(
                self.value_at(PositionX, time, 0.0),
                self.value_at(PositionY, time, 0.0),
                self.value_at(PositionZ, time, 0.0),
            ),
            rotation: heading_pitch_bank(
                self.value_at(Heading, time, 0.0),
                self.value_at(Pitch, time, 0.0),
                self.value_at(Bank, time, 0.0),
            ),
            scale: Vec3::new(
                self.value_at(ScaleX, time, 1.0),
                self.value_at(ScaleY, time, 1.0),
                self.value_at(ScaleZ, time, 1.0),
            ),
        }
    }

    /// Samples one key per frame from `first` to `last`; key times start at zero.
    pub fn sample(&self, node_name: &str, first: i32, last: i32, fps: f64) -> Option<NodeAnimation> {
        if !self.has_keys() || last < first || fps <= 0.0 {
            return None;
        }
        let mut channel = NodeAnimation::new(node_name);
        for frame in first..=last {
            let transform = self.transform_at(frame as f64 / fps);
            let time = (i64::from(frame) - i64::from(first)) as f64;
            channel
                .position_keys
                .push(AnimationKeyFrame::new(time, transform.translation));
            channel
                .rotation_keys
                .push(AnimationKeyFrame::new(time, transform.rotation));
            channel
                .scaling_keys
                .push(AnimationKeyFrame::new(time, transform.scale));
        }
        Some(channel)
    }
}
