//! WGSL shaders for the GPU backend
//!
//! The force kernel is generated with the node count, workgroup size and
//! force constants baked in as `const` declarations, so the compute pipeline
//! needs no uniform buffer. It mirrors `kernel::step_node` line for line.

use crate::kernel::ForceParams;

/// Entry point of the force kernel
pub const FORCE_ENTRY_POINT: &str = "compute_forces";

/// Force kernel template; `{{...}}` markers are replaced by [`force_shader`]
const FORCE_KERNEL: &str = r#"
@group(0) @binding(0) var<storage, read> position_in: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> position_out: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> neighbors: array<u32>;
@group(0) @binding(3) var<storage, read> adjacency: array<vec2<u32>>;

const NODE_COUNT: u32 = {{NODE_COUNT}}u;
const REPULSION_SCALE: f32 = {{REPULSION_SCALE}};
const FORCE_CLAMP: f32 = {{FORCE_CLAMP}};
const MIN_DISTANCE: f32 = {{MIN_DISTANCE}};

@compute @workgroup_size({{WORKGROUP_SIZE}})
fn compute_forces(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    // Padding invocations of the last workgroup
    if (idx >= NODE_COUNT) {
        return;
    }

    let p = position_in[idx];
    var force = vec2<f32>(0.0, 0.0);

    // Repulsion: normalize(d) / |d|^2, distance floored at MIN_DISTANCE
    for (var i = 0u; i < NODE_COUNT; i++) {
        if (i == idx) {
            continue;
        }
        let d = p - position_in[i];
        let len = max(length(d), MIN_DISTANCE);
        force += d * (REPULSION_SCALE / (len * len * len));
    }

    // Attraction: normalize(d) * |d|^2 toward each neighbor
    let range = adjacency[idx];
    for (var k = range.x; k < range.x + range.y; k++) {
        let d = position_in[neighbors[k]] - p;
        force += d * length(d);
    }

    force = clamp(force, vec2<f32>(-FORCE_CLAMP), vec2<f32>(FORCE_CLAMP));
    position_out[idx] = p + force;
}
"#;

/// Build the force kernel source for `node_count` nodes
pub fn force_shader(node_count: u32, workgroup_size: u32, params: &ForceParams) -> String {
    FORCE_KERNEL
        .replace("{{NODE_COUNT}}", &node_count.to_string())
        .replace("{{WORKGROUP_SIZE}}", &workgroup_size.to_string())
        .replace("{{REPULSION_SCALE}}", &wgsl_float(params.repulsion_scale))
        .replace("{{FORCE_CLAMP}}", &wgsl_float(params.force_clamp))
        .replace("{{MIN_DISTANCE}}", &wgsl_float(params.min_distance))
}

/// Edge shader: each vertex is a node index looked up in the position buffer
pub const EDGE_SHADER: &str = r#"
@group(0) @binding(0) var<storage, read> node_position: array<vec2<f32>>;

@vertex
fn vs_edge(@location(0) node: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(node_position[node], 0.0, 1.0);
}

@fragment
fn fs_edge() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
"#;

/// Node shader template; the circle mesh is scaled by `{{NODE_RADIUS}}`
const NODE_SHADER: &str = r#"
@group(0) @binding(0) var<storage, read> node_position: array<vec2<f32>>;

const NODE_RADIUS: f32 = {{NODE_RADIUS}};

struct VertexInput {
    @location(0) mesh: vec2<f32>,
    @builtin(instance_index) instance: u32,
}

@vertex
fn vs_node(input: VertexInput) -> @builtin(position) vec4<f32> {
    let pos = input.mesh * NODE_RADIUS + node_position[input.instance];
    return vec4<f32>(pos, 0.0, 1.0);
}

@fragment
fn fs_node() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 0.0, 1.0);
}
"#;

/// Build the node shader source for a given on-screen radius
pub fn node_shader(node_radius: f32) -> String {
    NODE_SHADER.replace("{{NODE_RADIUS}}", &wgsl_float(node_radius))
}

/// Format an `f32` as a WGSL float literal
fn wgsl_float(value: f32) -> String {
    // Debug always keeps a '.' or an exponent, so the literal stays a float
    format!("{value:?}")
}
