//! Polygon mesh kernel for the half-knife tool.
//!
//! `PolyMesh` stores vertices and polygon faces in index-based arenas.
//! Deletions tombstone entries instead of compacting, so vertex and face ids
//! stay stable for the lifetime of one knife gesture; `to_mesh` re-densifies
//! when flushing back to a Bevy mesh.
//!
//! Every topology or position mutation bumps a revision counter. The BVH
//! (`bvh::MeshBvh`) records the revision it was built from and refuses to
//! cast rays against a stale mesh.

use bevy::mesh::{Indices, PrimitiveTopology, VertexAttributeValues};
use bevy::prelude::*;

pub mod bvh;
pub mod ops;
pub mod project_cut;

pub use bvh::{MeshBvh, RayHit};
pub use project_cut::CutPolyline;

/// Index into the vertex arena.
pub type VertexId = u32;
/// Index into the face arena.
pub type FaceId = u32;

/// Canonical undirected edge (lower vertex id first).
///
/// Edges are derived from face rings rather than stored, so an edge is
/// identified by its endpoints alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshEdge(pub VertexId, pub VertexId);

impl MeshEdge {
    pub fn new(a: VertexId, b: VertexId) -> Self {
        if a <= b { MeshEdge(a, b) } else { MeshEdge(b, a) }
    }

    /// The endpoint that is not `v`.
    pub fn other(&self, v: VertexId) -> VertexId {
        if self.0 == v { self.1 } else { self.0 }
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.0 == v || self.1 == v
    }
}

/// Opaque mesh revision stamp. Compared by the BVH before ray casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshVersion(pub(crate) u64);

/// A mesh vertex. Selection lives on the kernel, like the host editors
/// this tool is modeled after.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub position: Vec3,
    pub selected: bool,
    pub(crate) alive: bool,
}

/// A polygon face: an ordered ring of vertex ids. N-gons are allowed —
/// cutting a quad produces non-triangular halves.
#[derive(Debug, Clone)]
pub struct Face {
    pub verts: Vec<VertexId>,
    pub(crate) alive: bool,
}

/// Arena-backed polygon mesh with stable ids and a revision counter.
#[derive(Debug, Clone, Default)]
pub struct PolyMesh {
    pub(crate) verts: Vec<Vertex>,
    pub(crate) faces: Vec<Face>,
    revision: u64,
}

impl PolyMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current revision stamp. Bumped by every mutation.
    pub fn version(&self) -> MeshVersion {
        MeshVersion(self.revision)
    }

    pub(crate) fn touch(&mut self) {
        self.revision += 1;
    }

    // -------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------

    pub fn add_vertex(&mut self, position: Vec3) -> VertexId {
        let id = self.verts.len() as VertexId;
        self.verts.push(Vertex {
            position,
            selected: false,
            alive: true,
        });
        self.touch();
        id
    }

    /// Add a polygon face from an ordered vertex ring.
    pub fn add_face(&mut self, ring: Vec<VertexId>) -> FaceId {
        debug_assert!(ring.len() >= 3, "face ring needs at least 3 vertices");
        let id = self.faces.len() as FaceId;
        self.faces.push(Face {
            verts: ring,
            alive: true,
        });
        self.touch();
        id
    }

    /// Build a `PolyMesh` from a Bevy `Mesh`.
    ///
    /// Returns `None` if the mesh lacks positions or uses a non-triangle
    /// topology. Triangles sharing positions must already share indices.
    pub fn from_mesh(mesh: &Mesh) -> Option<Self> {
        if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
            return None;
        }

        let positions: Vec<Vec3> = match mesh.attribute(Mesh::ATTRIBUTE_POSITION)? {
            VertexAttributeValues::Float32x3(v) => v.iter().map(|p| Vec3::from(*p)).collect(),
            _ => return None,
        };

        let triangles: Vec<[u32; 3]> = match mesh.indices() {
            Some(Indices::U32(indices)) => indices.chunks(3).map(|c| [c[0], c[1], c[2]]).collect(),
            Some(Indices::U16(indices)) => indices
                .chunks(3)
                .map(|c| [c[0] as u32, c[1] as u32, c[2] as u32])
                .collect(),
            None => (0..positions.len() as u32)
                .collect::<Vec<_>>()
                .chunks(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        };

        let mut out = PolyMesh::new();
        for p in positions {
            out.add_vertex(p);
        }
        for tri in triangles {
            out.add_face(vec![tri[0], tri[1], tri[2]]);
        }
        Some(out)
    }

    /// Convert back to a Bevy `Mesh`, fan-triangulating polygon faces and
    /// compacting away tombstoned entries. Normals are recomputed smooth.
    pub fn to_mesh(&self) -> Mesh {
        let mut remap = vec![u32::MAX; self.verts.len()];
        let mut positions: Vec<[f32; 3]> = Vec::new();
        for (i, v) in self.verts.iter().enumerate() {
            if v.alive {
                remap[i] = positions.len() as u32;
                positions.push([v.position.x, v.position.y, v.position.z]);
            }
        }

        let mut indices: Vec<u32> = Vec::new();
        let mut normals = vec![Vec3::ZERO; positions.len()];
        for face in self.faces.iter().filter(|f| f.alive) {
            let ring = &face.verts;
            if ring.len() < 3 {
                continue;
            }
            let n = self.ring_normal(ring);
            for &v in ring {
                normals[remap[v as usize] as usize] += n;
            }
            for i in 1..ring.len() - 1 {
                indices.push(remap[ring[0] as usize]);
                indices.push(remap[ring[i] as usize]);
                indices.push(remap[ring[i + 1] as usize]);
            }
        }

        let normals: Vec<[f32; 3]> = normals
            .into_iter()
            .map(|n| {
                let n = n.normalize_or_zero();
                [n.x, n.y, n.z]
            })
            .collect();
        let uvs = vec![[0.0f32, 0.0f32]; positions.len()];

        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, default());
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
        mesh.insert_indices(Indices::U32(indices));
        mesh
    }

    // -------------------------------------------------------------------
    // Element access
    // -------------------------------------------------------------------

    pub fn position(&self, v: VertexId) -> Vec3 {
        self.verts[v as usize].position
    }

    /// Move a vertex. Bumps the revision — cached ray structures become stale.
    pub fn set_position(&mut self, v: VertexId, position: Vec3) {
        self.verts[v as usize].position = position;
        self.touch();
    }

    pub fn is_vertex_alive(&self, v: VertexId) -> bool {
        (v as usize) < self.verts.len() && self.verts[v as usize].alive
    }

    pub fn is_face_alive(&self, f: FaceId) -> bool {
        (f as usize) < self.faces.len() && self.faces[f as usize].alive
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.verts
            .iter()
            .enumerate()
            .filter(|(_, v)| v.alive)
            .map(|(i, _)| i as VertexId)
    }

    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, f)| f.alive)
            .map(|(i, _)| i as FaceId)
    }

    pub fn vertex_count(&self) -> usize {
        self.verts.iter().filter(|v| v.alive).count()
    }

    pub fn face_count(&self) -> usize {
        self.faces.iter().filter(|f| f.alive).count()
    }

    pub fn face_verts(&self, f: FaceId) -> &[VertexId] {
        &self.faces[f as usize].verts
    }

    // -------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------

    pub fn is_selected(&self, v: VertexId) -> bool {
        self.verts[v as usize].selected
    }

    pub fn set_selected(&mut self, v: VertexId, selected: bool) {
        self.verts[v as usize].selected = selected;
    }

    pub fn selected_vertices(&self) -> Vec<VertexId> {
        self.vertex_ids()
            .filter(|&v| self.verts[v as usize].selected)
            .collect()
    }

    pub fn deselect_all(&mut self) {
        for v in &mut self.verts {
            v.selected = false;
        }
    }

    /// Select every vertex of a face (used to flag degenerate faces for the
    /// user before surfacing an error).
    pub fn select_face(&mut self, f: FaceId) {
        let ring = self.faces[f as usize].verts.clone();
        for v in ring {
            self.set_selected(v, true);
        }
    }

    // -------------------------------------------------------------------
    // Adjacency queries
    // -------------------------------------------------------------------

    /// Unique edges of the whole mesh, derived from alive face rings.
    pub fn edges(&self) -> Vec<MeshEdge> {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for f in self.face_ids() {
            for e in self.face_edges(f) {
                if seen.insert(e) {
                    out.push(e);
                }
            }
        }
        out
    }

    /// Ordered edges of a face ring.
    pub fn face_edges(&self, f: FaceId) -> Vec<MeshEdge> {
        let ring = &self.faces[f as usize].verts;
        let n = ring.len();
        (0..n)
            .map(|i| MeshEdge::new(ring[i], ring[(i + 1) % n]))
            .collect()
    }

    /// Faces containing vertex `v`.
    pub fn vertex_faces(&self, v: VertexId) -> Vec<FaceId> {
        self.face_ids()
            .filter(|&f| self.faces[f as usize].verts.contains(&v))
            .collect()
    }

    /// Unique edges incident to vertex `v`.
    pub fn vertex_edges(&self, v: VertexId) -> Vec<MeshEdge> {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for f in self.vertex_faces(v) {
            for e in self.face_edges(f) {
                if e.contains(v) && seen.insert(e) {
                    out.push(e);
                }
            }
        }
        out
    }

    /// Faces sharing edge `e` (1 for boundary edges, 2 for interior ones).
    pub fn edge_faces(&self, e: MeshEdge) -> Vec<FaceId> {
        self.face_ids()
            .filter(|&f| self.face_edges(f).contains(&e))
            .collect()
    }

    // -------------------------------------------------------------------
    // Derived geometry
    // -------------------------------------------------------------------

    /// Median center of a face ring.
    pub fn face_center(&self, f: FaceId) -> Vec3 {
        let ring = &self.faces[f as usize].verts;
        if ring.is_empty() {
            return Vec3::ZERO;
        }
        let sum: Vec3 = ring.iter().map(|&v| self.position(v)).sum();
        sum / ring.len() as f32
    }

    /// Face normal via Newell's method (stable for n-gons).
    pub fn face_normal(&self, f: FaceId) -> Vec3 {
        self.ring_normal(&self.faces[f as usize].verts)
    }

    fn ring_normal(&self, ring: &[VertexId]) -> Vec3 {
        let n = ring.len();
        let mut normal = Vec3::ZERO;
        for i in 0..n {
            let p0 = self.position(ring[i]);
            let p1 = self.position(ring[(i + 1) % n]);
            normal.x += (p0.y - p1.y) * (p0.z + p1.z);
            normal.y += (p0.z - p1.z) * (p0.x + p1.x);
            normal.z += (p0.x - p1.x) * (p0.y + p1.y);
        }
        normal.normalize_or_zero()
    }

    pub fn edge_midpoint(&self, e: MeshEdge) -> Vec3 {
        (self.position(e.0) + self.position(e.1)) * 0.5
    }
}
