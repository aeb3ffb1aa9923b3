//! Mesh generation for node rendering
//!
//! Nodes are drawn as instanced copies of a small triangle-fan circle.

use std::f32::consts::TAU;

use crate::state::Vec2;

/// Generate a unit circle as a triangle fan.
///
/// # Arguments
///
/// * `segments` - Number of rim vertices (8 is plenty at node size)
///
/// # Returns
///
/// A tuple of (vertices, indices). Vertex 0 is the centre; vertices
/// `1..=segments` lie on the rim at angle `TAU * i / segments`. Each of the
/// `segments` triangles is `(0, i + 1, i + 2)`, with the last wrapping to 1.
///
/// # Example
///
/// ```
/// use pingpong_layout::geometry::circle;
///
/// let (vertices, indices) = circle(8);
/// assert_eq!(vertices.len(), 9);
/// assert_eq!(indices.len(), 24);
/// ```
pub fn circle(segments: u32) -> (Vec<Vec2>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(segments as usize + 1);
    vertices.push([0.0, 0.0]);
    for i in 0..segments {
        let angle = TAU / segments as f32 * i as f32;
        vertices.push([angle.cos(), angle.sin()]);
    }

    let mut indices = Vec::with_capacity(3 * segments as usize);
    for i in 0..segments {
        indices.push(0);
        indices.push(i + 1);
        indices.push(if i == segments - 1 { 1 } else { i + 2 });
    }

    (vertices, indices)
}
