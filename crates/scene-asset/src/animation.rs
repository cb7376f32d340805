use std::{
    fmt::Debug,
    ops::{Add, Mul},
};

use glam::{Quat, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationKeyFrame<T: Debug + Clone> {
    /// Time in ticks.
    pub time: f64,
    pub value: T,
}

impl<T: Debug + Clone> AnimationKeyFrame<T> {
    pub fn new(time: f64, value: T) -> Self {
        Self { time, value }
    }
}

/// Keyframes driving the transform of one node, addressed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAnimation {
    pub node_name: String,
    pub position_keys: Vec<AnimationKeyFrame<Vec3>>,
    pub rotation_keys: Vec<AnimationKeyFrame<Quat>>,
    pub scaling_keys: Vec<AnimationKeyFrame<Vec3>>,
}

impl NodeAnimation {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position_keys.is_empty() && self.rotation_keys.is_empty() && self.scaling_keys.is_empty()
    }

    pub fn last_time(&self) -> f64 {
        let positions = self.position_keys.iter().map(|key| key.time);
        let rotations = self.rotation_keys.iter().map(|key| key.time);
        let scalings = self.scaling_keys.iter().map(|key| key.time);
        positions.chain(rotations).chain(scalings).fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationAsset {
    pub name: Option<String>,
    /// Duration in ticks.
    pub duration: f64,
    pub ticks_per_second: f64,
    pub channels: Vec<NodeAnimation>,
}

pub trait Interpolate {
    fn linear(a: Self, b: Self, t: f32) -> Self;
    /// Cubic Hermite segment from `vk` with out-tangent `bk` to `vk_1` with
    /// in-tangent `ak_1`; `td` scales the tangents to the segment length.
    fn cubic_spline(vk: Self, bk: Self, vk_1: Self, ak_1: Self, t: f32, td: f32) -> Self;
}

impl<T> Interpolate for T
where
    T: Mul<f32, Output = T> + Add<T, Output = T>,
{
    fn linear(a: Self, b: Self, t: f32) -> Self {
        a * (1.0 - t) + b * t
    }

    fn cubic_spline(vk: Self, bk: Self, vk_1: Self, ak_1: Self, t: f32, td: f32) -> Self {
        let t3 = t.powi(3);
        let t2 = t.powi(2);
        let first = vk * (2.0 * t3 - 3.0 * t2 + 1.0);
        let second = bk * (td * (t3 - 2.0 * t2 + t));
        let third = vk_1 * (-2.0 * t3 + 3.0 * t2);
        let forth = ak_1 * (td * (t3 - t2));
        first + second + third + forth
    }
}
