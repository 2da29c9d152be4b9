//! Polygon meshes as four owned element arrays, the way `Mesh` stores them
//! in `mvert`/`medge`/`mpoly`/`mloop`.

use super::{id::IdRef, ModelError};
use crate::{
    layout::Layouts,
    record::{Record, RecordBuf},
};
use log::trace;
use serde::Serialize;
use std::{collections::HashSet, convert::TryFrom};

#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize)]
pub struct Vertex {
    pub co: [f32; 3],
    pub flag: u8,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub v1: u32,
    pub v2: u32,
    pub flag: i16,
}

impl Edge {
    pub fn connects(&self, a: u32, b: u32) -> bool {
        (self.v1 == a && self.v2 == b) || (self.v1 == b && self.v2 == a)
    }
}

/// A face: a run of `loop_count` loops starting at `loop_start`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Poly {
    pub loop_start: u32,
    pub loop_count: u32,
    pub material: i16,
}

/// A face corner: the vertex, and the edge to the next corner.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Loop {
    pub v: u32,
    pub e: u32,
}

/// Packed bytes of each element array, ready to be stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshArrays {
    pub verts: Vec<u8>,
    pub edges: Vec<u8>,
    pub polys: Vec<u8>,
    pub loops: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    pub polys: Vec<Poly>,
    pub loops: Vec<Loop>,
    /// Material slots, indexed by `Poly::material`.
    pub materials: Vec<Option<IdRef>>,
}

/// The first vertex a face visits twice.
fn repeated_vertex(corners: impl IntoIterator<Item = u32>) -> Option<u32> {
    let mut seen = HashSet::new();
    corners.into_iter().find(|v| !seen.insert(*v))
}

fn non_negative(value: i32, what: &str) -> Result<u32, ModelError> {
    u32::try_from(value).map_err(|_| ModelError::InvalidMesh(format!("negative {} {}", what, value)))
}

impl Mesh {
    pub fn new() -> Mesh {
        Mesh::default()
    }

    /// Builds a mesh from packed `MVert`, `MEdge`, `MPoly` and `MLoop` arrays.
    pub fn from_records(
        layouts: &Layouts,
        verts: &[u8],
        edges: &[u8],
        polys: &[u8],
        loops: &[u8],
    ) -> Result<Mesh, crate::Error> {
        let mut mesh = Mesh::new();
        for record in Record::array(layouts, "MVert", verts)? {
            mesh.vertices.push(Vertex {
                co: record.get_f32_array("co")?,
                flag: record.get_u8("flag")?,
            });
        }
        for record in Record::array(layouts, "MEdge", edges)? {
            mesh.edges.push(Edge {
                v1: record.get_u32("v1")?,
                v2: record.get_u32("v2")?,
                flag: record.get_i16("flag")?,
            });
        }
        for record in Record::array(layouts, "MPoly", polys)? {
            mesh.polys.push(Poly {
                loop_start: non_negative(record.get_i32("loopstart")?, "loop start")?,
                loop_count: non_negative(record.get_i32("totloop")?, "loop count")?,
                material: record.get_i16("mat_nr")?,
            });
        }
        for record in Record::array(layouts, "MLoop", loops)? {
            mesh.loops.push(Loop {
                v: record.get_u32("v")?,
                e: record.get_u32("e")?,
            });
        }
        trace!(
            "read mesh: {} verts, {} edges, {} polys, {} loops",
            mesh.vertices.len(),
            mesh.edges.len(),
            mesh.polys.len(),
            mesh.loops.len()
        );
        Ok(mesh)
    }

    pub fn write_arrays(&self, layouts: &Layouts) -> Result<MeshArrays, crate::Error> {
        let mut out = MeshArrays::default();
        for vertex in &self.vertices {
            let mut buf = RecordBuf::zeroed(layouts, "MVert")?;
            let mut record = buf.as_mut();
            record.set_slice("co", &vertex.co)?;
            record.set_u8("flag", vertex.flag)?;
            out.verts.extend_from_slice(buf.bytes());
        }
        for edge in &self.edges {
            let mut buf = RecordBuf::zeroed(layouts, "MEdge")?;
            let mut record = buf.as_mut();
            record.set_u32("v1", edge.v1)?;
            record.set_u32("v2", edge.v2)?;
            record.set_i16("flag", edge.flag)?;
            out.edges.extend_from_slice(buf.bytes());
        }
        for poly in &self.polys {
            let mut buf = RecordBuf::zeroed(layouts, "MPoly")?;
            let mut record = buf.as_mut();
            let loop_start = i32::try_from(poly.loop_start)
                .map_err(|_| ModelError::InvalidMesh(format!("loop start {} too large", poly.loop_start)))?;
            let loop_count = i32::try_from(poly.loop_count)
                .map_err(|_| ModelError::InvalidMesh(format!("loop count {} too large", poly.loop_count)))?;
            record.set_i32("loopstart", loop_start)?;
            record.set_i32("totloop", loop_count)?;
            record.set_i16("mat_nr", poly.material)?;
            out.polys.extend_from_slice(buf.bytes());
        }
        for corner in &self.loops {
            let mut buf = RecordBuf::zeroed(layouts, "MLoop")?;
            let mut record = buf.as_mut();
            record.set_u32("v", corner.v)?;
            record.set_u32("e", corner.e)?;
            out.loops.extend_from_slice(buf.bytes());
        }
        Ok(out)
    }

    pub fn add_vertex(&mut self, co: [f32; 3]) -> u32 {
        self.vertices.push(Vertex { co, flag: 0 });
        self.vertices.len() as u32 - 1
    }

    /// Returns the edge between `a` and `b`, adding it if needed.
    pub fn ensure_edge(&mut self, a: u32, b: u32) -> u32 {
        match self.edges.iter().position(|e| e.connects(a, b)) {
            Some(index) => index as u32,
            None => {
                self.edges.push(Edge {
                    v1: a,
                    v2: b,
                    flag: 0,
                });
                self.edges.len() as u32 - 1
            }
        }
    }

    /// Adds a face through `corners` in order, creating missing edges.
    pub fn add_poly(&mut self, corners: &[u32]) -> Result<usize, ModelError> {
        if corners.len() < 3 {
            return Err(ModelError::InvalidMesh(format!(
                "a face needs 3 corners, got {}",
                corners.len()
            )));
        }
        if let Some(v) = corners.iter().find(|v| **v as usize >= self.vertices.len()) {
            return Err(ModelError::InvalidMesh(format!("no vertex {}", v)));
        }
        if let Some(v) = repeated_vertex(corners.iter().copied()) {
            return Err(ModelError::InvalidMesh(format!("face repeats vertex {}", v)));
        }
        let loop_start = self.loops.len() as u32;
        for (i, &v) in corners.iter().enumerate() {
            let next = corners[(i + 1) % corners.len()];
            let e = self.ensure_edge(v, next);
            self.loops.push(Loop { v, e });
        }
        self.polys.push(Poly {
            loop_start,
            loop_count: corners.len() as u32,
            material: 0,
        });
        Ok(self.polys.len() - 1)
    }

    /// The loops of face `index`.
    pub fn poly_loops(&self, index: usize) -> Option<&[Loop]> {
        let poly = self.polys.get(index)?;
        let start = poly.loop_start as usize;
        self.loops.get(start..start + poly.loop_count as usize)
    }

    /// Checks that every index points into its array, that faces are at
    /// least triangles visiting each vertex once, and that each loop's edge
    /// joins it to the next corner.
    pub fn validate(&self) -> Result<(), ModelError> {
        let verts = self.vertices.len();
        for (i, edge) in self.edges.iter().enumerate() {
            if edge.v1 as usize >= verts || edge.v2 as usize >= verts {
                return Err(ModelError::InvalidMesh(format!("edge {} uses a missing vertex", i)));
            }
            if edge.v1 == edge.v2 {
                return Err(ModelError::InvalidMesh(format!("edge {} is degenerate", i)));
            }
        }
        for (i, corner) in self.loops.iter().enumerate() {
            if corner.v as usize >= verts {
                return Err(ModelError::InvalidMesh(format!("loop {} uses a missing vertex", i)));
            }
            if corner.e as usize >= self.edges.len() {
                return Err(ModelError::InvalidMesh(format!("loop {} uses a missing edge", i)));
            }
        }
        for (i, poly) in self.polys.iter().enumerate() {
            if poly.loop_count < 3 {
                return Err(ModelError::InvalidMesh(format!("face {} has {} corners", i, poly.loop_count)));
            }
            let loops = self
                .poly_loops(i)
                .ok_or_else(|| ModelError::InvalidMesh(format!("face {} runs past the loop array", i)))?;
            if let Some(v) = repeated_vertex(loops.iter().map(|l| l.v)) {
                return Err(ModelError::InvalidMesh(format!("face {} repeats vertex {}", i, v)));
            }
            for (j, corner) in loops.iter().enumerate() {
                let next = loops[(j + 1) % loops.len()];
                if !self.edges[corner.e as usize].connects(corner.v, next.v) {
                    return Err(ModelError::InvalidMesh(format!(
                        "face {} corner {} has the wrong edge",
                        i, j
                    )));
                }
            }
            if poly.material < 0 || (!self.materials.is_empty() && poly.material as usize >= self.materials.len()) {
                return Err(ModelError::InvalidMesh(format!("face {} uses a missing material slot", i)));
            }
        }
        Ok(())
    }

    /// Every material this mesh uses.
    pub fn references(&self) -> impl Iterator<Item = IdRef> + '_ {
        self.materials.iter().filter_map(|m| *m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::Catalog, parsers::Target, record::RecordError};

    fn quad() -> Mesh {
        let mut mesh = Mesh::new();
        for co in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]].iter() {
            mesh.add_vertex(*co);
        }
        mesh.add_poly(&[0, 1, 2, 3]).unwrap();
        mesh
    }

    #[test]
    fn faces_create_edges() {
        let mut mesh = quad();
        assert_eq!(mesh.edges.len(), 4);
        assert_eq!(mesh.loops.len(), 4);
        mesh.add_poly(&[0, 2, 3]).unwrap();
        assert_eq!(mesh.edges.len(), 5);
        mesh.validate().unwrap();
        assert_eq!(mesh.poly_loops(1).map(<[Loop]>::len), Some(3));
        assert!(mesh.add_poly(&[0, 1]).is_err());
        assert!(mesh.add_poly(&[0, 1, 9]).is_err());
    }

    #[test]
    fn faces_visit_each_vertex_once() {
        let mut mesh = quad();
        let before = mesh.clone();
        assert_eq!(
            mesh.add_poly(&[0, 1, 1, 2]),
            Err(ModelError::InvalidMesh("face repeats vertex 1".to_string()))
        );
        assert!(mesh.add_poly(&[2, 3, 2]).is_err());
        assert_eq!(mesh, before);

        mesh.loops[3].v = 0;
        assert_eq!(
            mesh.validate(),
            Err(ModelError::InvalidMesh("face 0 repeats vertex 0".to_string()))
        );
    }

    #[test]
    fn validate_catches_bad_indices() {
        let mut mesh = quad();
        mesh.loops[1].e = 0;
        assert!(matches!(mesh.validate(), Err(ModelError::InvalidMesh(_))));

        let mut mesh = quad();
        mesh.polys[0].loop_count = 5;
        assert!(mesh.validate().is_err());

        let mut mesh = quad();
        mesh.edges[0].v2 = 7;
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn arrays_round_trip() {
        let catalog = Catalog::builtin().unwrap();
        for target in [Target::LITTLE_32, Target::LITTLE_64].iter() {
            let layouts = catalog.layouts(*target).unwrap();
            let mesh = quad();
            let arrays = mesh.write_arrays(&layouts).unwrap();
            assert_eq!(arrays.verts.len(), 4 * 20);
            assert_eq!(arrays.loops.len(), 4 * 8);
            let read = Mesh::from_records(
                &layouts,
                &arrays.verts,
                &arrays.edges,
                &arrays.polys,
                &arrays.loops,
            )
            .unwrap();
            assert_eq!(read, mesh);
        }
    }

    #[test]
    fn truncated_array_is_rejected() {
        let catalog = Catalog::builtin().unwrap();
        let layouts = catalog.layouts(Target::default()).unwrap();
        assert!(Mesh::from_records(&layouts, &[0; 21], &[], &[], &[]).is_err());

        let arrays = quad().write_arrays(&layouts).unwrap();
        let short = &arrays.edges[..arrays.edges.len() - 1];
        assert!(matches!(
            Mesh::from_records(&layouts, &arrays.verts, short, &arrays.polys, &arrays.loops),
            Err(crate::Error::Record(RecordError::WrongSize { .. }))
        ));
        let mut extra = arrays.loops.clone();
        extra.extend_from_slice(&[0; 3]);
        assert!(Mesh::from_records(&layouts, &arrays.verts, &arrays.edges, &arrays.polys, &extra).is_err());
    }

    #[test]
    fn negative_poly_counts_are_rejected() {
        let catalog = Catalog::builtin().unwrap();
        let layouts = catalog.layouts(Target::default()).unwrap();
        let arrays = quad().write_arrays(&layouts).unwrap();

        let mut poly = RecordBuf::zeroed(&layouts, "MPoly").unwrap();
        poly.as_mut().set_i32("totloop", -4).unwrap();
        let err = Mesh::from_records(&layouts, &arrays.verts, &arrays.edges, poly.bytes(), &arrays.loops)
            .unwrap_err();
        assert_eq!(
            err,
            crate::Error::Model(ModelError::InvalidMesh("negative loop count -4".to_string()))
        );

        let mut poly = RecordBuf::zeroed(&layouts, "MPoly").unwrap();
        poly.as_mut().set_i32("loopstart", -1).unwrap();
        assert!(
            Mesh::from_records(&layouts, &arrays.verts, &arrays.edges, poly.bytes(), &arrays.loops).is_err()
        );
    }
}
