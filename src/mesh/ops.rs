//! Topology operations on [`PolyMesh`].
//!
//! These are the primitives the knife committer is built from: edge splits,
//! face pokes, edge dissolves, welding and circle selection. Every operation
//! keeps face rings wound consistently and bumps the mesh revision.

use bevy::prelude::*;

use super::{FaceId, MeshEdge, PolyMesh, VertexId};
use crate::knife::geometry::ViewContext;

impl PolyMesh {
    /// Split `edge` at `ratio` (measured from the lower-id endpoint).
    ///
    /// Returns the vertex at the split point and the two sub-edges, lower-id
    /// side first. A ratio at (or clamped to) 0 or 1 returns the existing
    /// endpoint without mutating anything — snapping near an endpoint must
    /// not create a sliver edge.
    pub fn split_edge(&mut self, edge: MeshEdge, ratio: f32) -> (VertexId, MeshEdge, MeshEdge) {
        let ratio = ratio.clamp(0.0, 1.0);
        if ratio <= 0.0 {
            return (edge.0, edge, edge);
        }
        if ratio >= 1.0 {
            return (edge.1, edge, edge);
        }

        let point = self.position(edge.0).lerp(self.position(edge.1), ratio);
        let mid = self.add_vertex(point);

        for face in &mut self.faces {
            if !face.alive {
                continue;
            }
            let ring = &mut face.verts;
            let n = ring.len();
            let mut insert_at = None;
            for i in 0..n {
                let a = ring[i];
                let b = ring[(i + 1) % n];
                if MeshEdge::new(a, b) == edge {
                    insert_at = Some(i + 1);
                    break;
                }
            }
            if let Some(i) = insert_at {
                ring.insert(i, mid);
            }
        }
        self.touch();
        (mid, MeshEdge::new(edge.0, mid), MeshEdge::new(mid, edge.1))
    }

    /// Poke `face` at `point`: replace the polygon with a triangle fan around
    /// a new vertex at `point`. Returns the new vertex.
    pub fn poke_face(&mut self, face: FaceId, point: Vec3) -> VertexId {
        let ring = self.faces[face as usize].verts.clone();
        self.faces[face as usize].alive = false;
        let center = self.add_vertex(point);
        let n = ring.len();
        for i in 0..n {
            self.add_face(vec![ring[i], ring[(i + 1) % n], center]);
        }
        center
    }

    /// Dissolve `edge`, merging its two adjacent faces into one ring.
    ///
    /// Boundary edges (a single adjacent face) are left alone. Vertices are
    /// always kept; lonely-vertex cleanup is a separate pass.
    pub fn dissolve_edge(&mut self, edge: MeshEdge) {
        let faces = self.edge_faces(edge);
        if faces.len() != 2 {
            return;
        }
        let (f1, f2) = (faces[0], faces[1]);

        // Rotate f1's ring to start just past the edge and f2's to start just
        // past it from the other side; splicing the interiors preserves the
        // winding of f1.
        let r1 = self.faces[f1 as usize].verts.clone();
        let r2 = self.faces[f2 as usize].verts.clone();

        let Some((a, b)) = ring_edge_order(&r1, edge) else {
            return;
        };
        let mut r1 = r1;
        rotate_ring_to_start(&mut r1, b);
        debug_assert_eq!(*r1.last().unwrap_or(&b), a);

        let mut r2 = r2;
        rotate_ring_to_start(&mut r2, a);
        // r2 runs [a, ..., b]; drop both shared endpoints.
        let interior: Vec<VertexId> = if *r2.last().unwrap_or(&a) == b {
            r2[1..r2.len() - 1].to_vec()
        } else {
            // Inconsistent winding between the two faces; merge by reversing.
            let mut rev = r2.clone();
            rev.reverse();
            rotate_ring_to_start(&mut rev, a);
            if *rev.last().unwrap_or(&a) != b {
                return;
            }
            rev[1..rev.len() - 1].to_vec()
        };

        let mut merged = r1;
        merged.extend(interior);
        self.faces[f1 as usize].verts = merged;
        self.faces[f2 as usize].alive = false;
        self.touch();
    }

    pub fn dissolve_edges(&mut self, edges: &[MeshEdge]) {
        for &e in edges {
            self.dissolve_edge(e);
        }
    }

    /// Reduce the edges around `v` down to two, dissolving the rest.
    ///
    /// Edges leading to a vertex in `keep` are never dissolved. Used after a
    /// face poke to turn the triangle fan back into the original polygon with
    /// the poked vertex sitting on it.
    pub fn dissolve_redundant_edges(&mut self, v: VertexId, keep: &[VertexId]) {
        loop {
            let edges = self.vertex_edges(v);
            let kept = edges
                .iter()
                .filter(|e| keep.contains(&e.other(v)))
                .count();
            if edges.len() <= kept.max(2) {
                return;
            }
            let removable = edges.iter().find(|e| {
                !keep.contains(&e.other(v)) && self.edge_faces(**e).len() == 2
            });
            match removable {
                Some(&e) => self.dissolve_edge(e),
                None => return,
            }
        }
    }

    /// Poke `face` at `point` and dissolve the fan back down, leaving a
    /// vertex embedded in the polygon with minimal extra edges.
    pub fn insert_vertex_on_face(
        &mut self,
        face: FaceId,
        point: Vec3,
        keep: &[VertexId],
    ) -> VertexId {
        let v = self.poke_face(face, point);
        self.dissolve_redundant_edges(v, keep);
        v
    }

    /// Split `face` along the chord between two non-adjacent ring vertices.
    /// Returns the two replacement faces, the `a`-first half first.
    pub fn split_face(&mut self, face: FaceId, a: VertexId, b: VertexId) -> Option<(FaceId, FaceId)> {
        let mut ring = self.faces[face as usize].verts.clone();
        let pa = ring.iter().position(|&v| v == a)?;
        ring.rotate_left(pa);
        let pb = ring.iter().position(|&v| v == b)?;
        if pb <= 1 || pb == ring.len() - 1 {
            // Adjacent vertices already share an edge; nothing to split.
            return None;
        }
        let first = ring[..=pb].to_vec();
        let second: Vec<VertexId> = ring[pb..].iter().copied().chain(std::iter::once(a)).collect();
        self.faces[face as usize].alive = false;
        let f1 = self.add_face(first);
        let f2 = self.add_face(second);
        Some((f1, f2))
    }

    /// Weld `candidates` that lie within `distance` of each other into
    /// single vertices at their cluster centroids. Union-find clustering,
    /// then ring remapping; faces collapsing below 3 distinct vertices die.
    pub fn weld_vertices(&mut self, candidates: &[VertexId], distance: f32) {
        let mut parent: std::collections::HashMap<VertexId, VertexId> =
            candidates.iter().map(|&v| (v, v)).collect();

        fn find(parent: &mut std::collections::HashMap<VertexId, VertexId>, v: VertexId) -> VertexId {
            let p = parent[&v];
            if p == v {
                return v;
            }
            let root = find(parent, p);
            parent.insert(v, root);
            root
        }

        let d2 = distance * distance;
        for i in 0..candidates.len() {
            for j in i + 1..candidates.len() {
                let (a, b) = (candidates[i], candidates[j]);
                if !self.is_vertex_alive(a) || !self.is_vertex_alive(b) {
                    continue;
                }
                if self.position(a).distance_squared(self.position(b)) <= d2 {
                    let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                    if ra != rb {
                        parent.insert(rb, ra);
                    }
                }
            }
        }

        // Collapse each cluster onto its root, positioned at the centroid.
        let mut clusters: std::collections::HashMap<VertexId, Vec<VertexId>> = default();
        for &v in candidates {
            let root = find(&mut parent, v);
            clusters.entry(root).or_default().push(v);
        }

        let mut remap: std::collections::HashMap<VertexId, VertexId> = default();
        let mut mutated = false;
        for (root, members) in &clusters {
            if members.len() < 2 {
                continue;
            }
            let centroid: Vec3 =
                members.iter().map(|&v| self.position(v)).sum::<Vec3>() / members.len() as f32;
            self.verts[*root as usize].position = centroid;
            for &v in members {
                if v != *root {
                    remap.insert(v, *root);
                    if self.verts[v as usize].selected {
                        self.verts[*root as usize].selected = true;
                    }
                    self.verts[v as usize].alive = false;
                    mutated = true;
                }
            }
        }
        if !mutated {
            return;
        }

        for face in &mut self.faces {
            if !face.alive {
                continue;
            }
            for v in &mut face.verts {
                if let Some(&r) = remap.get(v) {
                    *v = r;
                }
            }
            face.verts.dedup();
            while face.verts.len() > 1 && face.verts.first() == face.verts.last() {
                face.verts.pop();
            }
            if face.verts.len() < 3 {
                face.alive = false;
            }
        }
        self.touch();
    }

    /// Tombstone `verts` and every face touching them.
    pub fn delete_vertices(&mut self, verts: &[VertexId]) {
        let mut mutated = false;
        for &v in verts {
            if !self.is_vertex_alive(v) {
                continue;
            }
            self.verts[v as usize].alive = false;
            mutated = true;
            for face in &mut self.faces {
                if face.alive && face.verts.contains(&v) {
                    face.alive = false;
                }
            }
        }
        if mutated {
            self.touch();
        }
    }

    /// Select every vertex whose screen projection falls within `radius_px`
    /// of `screen_point`. Additive when `add` is set.
    pub fn select_near(&mut self, view: &ViewContext, screen_point: Vec2, radius_px: f32, add: bool) {
        if !add {
            self.deselect_all();
        }
        let ids: Vec<VertexId> = self.vertex_ids().collect();
        for v in ids {
            if let Some(px) = view.project_to_screen(self.position(v)) {
                if px.distance(screen_point) <= radius_px {
                    self.set_selected(v, true);
                }
            }
        }
    }
}

fn ring_edge_order(ring: &[VertexId], edge: MeshEdge) -> Option<(VertexId, VertexId)> {
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if MeshEdge::new(a, b) == edge {
            return Some((a, b));
        }
    }
    None
}

fn rotate_ring_to_start(ring: &mut Vec<VertexId>, start: VertexId) {
    if let Some(pos) = ring.iter().position(|&v| v == start) {
        ring.rotate_left(pos);
    }
}
