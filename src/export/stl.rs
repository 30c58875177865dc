use std::io::{self, Write};

use stl_io::{Normal, Triangle, Vertex};

use super::MeshView;

/// Writes binary STL. Facet normals follow the counter-clockwise winding.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn write(view: &MeshView<'_>, out: &mut impl Write) -> io::Result<()> {
    let to_f32 = |p: [f64; 3]| p.map(|c| c as f32);
    let triangles: Vec<Triangle> = view
        .faces
        .iter()
        .map(|face| {
            let [a, b, c] = view.triangle(face);
            Triangle {
                normal: Normal::new(to_f32(facet_normal(a, b, c))),
                vertices: [a, b, c].map(|p| Vertex::new(to_f32(p))),
            }
        })
        .collect();
    stl_io::write_stl(out, triangles.iter())
}

fn facet_normal(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> [f64; 3] {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > 0.0 {
        n.map(|c| c / len)
    } else {
        [0.0; 3]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn normals_follow_winding() {
        let n = facet_normal([0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert_eq!(n, [0.0, 0.0, 1.0]);
        assert_eq!(facet_normal([0.0; 3], [0.0; 3], [1.0, 0.0, 0.0]), [0.0; 3]);
    }

    #[test]
    fn binary_layout_reads_back() {
        let faces = [[0, 1, 2]];
        let view = MeshView {
            title: "t",
            vertices: vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]],
            faces: &faces,
            cell_index: vec![0],
        };
        let mut bytes = Vec::new();
        write(&view, &mut bytes).unwrap();
        // 80-byte header, face count, 50 bytes per facet.
        assert_eq!(bytes.len(), 80 + 4 + 50);
        let mesh = stl_io::read_stl(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.faces[0].normal[2], 1.0);
    }
}
