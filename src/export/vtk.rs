use std::io::{self, Write};

use super::MeshView;

/// Writes legacy ASCII VTK poly data with a `cell_index` cell scalar.
pub(crate) fn write_legacy(view: &MeshView<'_>, out: &mut impl Write) -> io::Result<()> {
    let faces = view.faces.len();
    writeln!(out, "# vtk DataFile Version 3.0")?;
    writeln!(out, "{}", view.title)?;
    writeln!(out, "ASCII")?;
    writeln!(out, "DATASET POLYDATA")?;
    writeln!(out, "POINTS {} double", view.vertices.len())?;
    for [x, y, z] in &view.vertices {
        writeln!(out, "{x} {y} {z}")?;
    }
    writeln!(out, "POLYGONS {faces} {}", faces * 4)?;
    for [a, b, c] in view.faces {
        writeln!(out, "3 {a} {b} {c}")?;
    }
    writeln!(out, "CELL_DATA {faces}")?;
    writeln!(out, "SCALARS cell_index int 1")?;
    writeln!(out, "LOOKUP_TABLE default")?;
    for tag in &view.cell_index {
        writeln!(out, "{tag}")?;
    }
    Ok(())
}

/// Writes VTK XML poly data (`.vtp`) with ASCII data arrays.
pub(crate) fn write_xml(view: &MeshView<'_>, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, r#"<?xml version="1.0"?>"#)?;
    writeln!(out, r#"<VTKFile type="PolyData" version="0.1" byte_order="LittleEndian">"#)?;
    writeln!(out, "  <!-- {} -->", view.title.replace("--", "__"))?;
    writeln!(out, "  <PolyData>")?;
    writeln!(
        out,
        concat!(
            r#"    <Piece NumberOfPoints="{}" NumberOfVerts="0" NumberOfLines="0""#,
            r#" NumberOfStrips="0" NumberOfPolys="{}">"#
        ),
        view.vertices.len(),
        view.faces.len()
    )?;

    writeln!(out, "      <Points>")?;
    writeln!(out, r#"        <DataArray type="Float64" NumberOfComponents="3" format="ascii">"#)?;
    for [x, y, z] in &view.vertices {
        writeln!(out, "          {x} {y} {z}")?;
    }
    writeln!(out, "        </DataArray>")?;
    writeln!(out, "      </Points>")?;

    writeln!(out, "      <Polys>")?;
    writeln!(out, r#"        <DataArray type="Int64" Name="connectivity" format="ascii">"#)?;
    for [a, b, c] in view.faces {
        writeln!(out, "          {a} {b} {c}")?;
    }
    writeln!(out, "        </DataArray>")?;
    writeln!(out, r#"        <DataArray type="Int64" Name="offsets" format="ascii">"#)?;
    for i in 1..=view.faces.len() {
        writeln!(out, "          {}", i * 3)?;
    }
    writeln!(out, "        </DataArray>")?;
    writeln!(out, "      </Polys>")?;

    writeln!(out, r#"      <CellData Scalars="cell_index">"#)?;
    writeln!(out, r#"        <DataArray type="Int32" Name="cell_index" format="ascii">"#)?;
    for tag in &view.cell_index {
        writeln!(out, "          {tag}")?;
    }
    writeln!(out, "        </DataArray>")?;
    writeln!(out, "      </CellData>")?;
    writeln!(out, "    </Piece>")?;
    writeln!(out, "  </PolyData>")?;
    writeln!(out, "</VTKFile>")?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square() -> (Vec<[f64; 3]>, [[u32; 3]; 2]) {
        (
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            [[0, 1, 2], [0, 2, 3]],
        )
    }

    fn render(write: fn(&MeshView<'_>, &mut Vec<u8>) -> io::Result<()>) -> String {
        let (vertices, faces) = square();
        let view = MeshView {
            title: "square",
            vertices,
            faces: &faces,
            cell_index: vec![0, 1],
        };
        let mut bytes = Vec::new();
        write(&view, &mut bytes).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn legacy_sections() {
        let text = render(|v, o| write_legacy(v, o));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "# vtk DataFile Version 3.0");
        assert_eq!(lines[1], "square");
        assert_eq!(lines[4], "POINTS 4 double");
        assert_eq!(lines[9], "POLYGONS 2 8");
        assert_eq!(lines[10], "3 0 1 2");
        assert_eq!(lines[12], "CELL_DATA 2");
        assert_eq!(&lines[15..], ["0", "1"]);
    }

    #[test]
    fn xml_offsets_and_tags() {
        let text = render(|v, o| write_xml(v, o));
        assert!(text.contains(r#"NumberOfPoints="4""#));
        assert!(text.contains(r#"NumberOfPolys="2""#));
        let offsets: Vec<_> = text
            .lines()
            .skip_while(|l| !l.contains(r#"Name="offsets""#))
            .skip(1)
            .take(2)
            .map(str::trim)
            .collect();
        assert_eq!(offsets, ["3", "6"]);
        assert!(text.trim_end().ends_with("</VTKFile>"));
    }
}
