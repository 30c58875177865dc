use std::io::{self, Write};

use super::MeshView;

/// Writes ASCII PLY with a `cell_index` face property.
pub(crate) fn write(view: &MeshView<'_>, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "comment {}", view.title)?;
    writeln!(out, "element vertex {}", view.vertices.len())?;
    writeln!(out, "property double x")?;
    writeln!(out, "property double y")?;
    writeln!(out, "property double z")?;
    writeln!(out, "element face {}", view.faces.len())?;
    writeln!(out, "property list uchar int vertex_indices")?;
    writeln!(out, "property int cell_index")?;
    writeln!(out, "end_header")?;

    for [x, y, z] in &view.vertices {
        writeln!(out, "{x} {y} {z}")?;
    }
    for ([a, b, c], tag) in view.faces.iter().zip(&view.cell_index) {
        writeln!(out, "3 {a} {b} {c} {tag}")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_and_tagged_faces() {
        let faces = [[0, 1, 2], [0, 2, 3]];
        let view = MeshView {
            title: "slab",
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.5]],
            faces: &faces,
            cell_index: vec![4, -1],
        };
        let mut bytes = Vec::new();
        write(&view, &mut bytes).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("ply\nformat ascii 1.0\ncomment slab\n"));
        assert!(text.contains("element vertex 4\n"));
        assert!(text.contains("element face 2\n"));
        assert!(text.contains("\n0 1 0.5\n"));
        assert!(text.ends_with("3 0 1 2 4\n3 0 2 3 -1\n"));
    }
}
