use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use docx_rs::{AlignmentType, BreakType, Docx, Paragraph, Pic, Run, Table, TableCell, TableRow};

use super::assemble::{CellContent, ReportCell, ReportPage};
use crate::util::ensure_directory;

// A4 with width and height swapped.
const LANDSCAPE_WIDTH_TWIPS: u32 = 16_838;
const LANDSCAPE_HEIGHT_TWIPS: u32 = 11_906;
const COLUMN_WIDTH_TWIPS: usize = 7_200;
const EMU_PER_INCH: f64 = 914_400.0;

pub(crate) fn build_document(pages: &[ReportPage], image_width_in: f64) -> Docx {
    let mut docx = Docx::new().page_size(LANDSCAPE_WIDTH_TWIPS, LANDSCAPE_HEIGHT_TWIPS);

    for page in pages {
        docx = docx
            .add_paragraph(header_paragraph(page))
            .add_table(comparison_table(page, image_width_in))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)));
    }

    docx
}

/// Packs the document and writes it in one go.
pub(crate) fn save_document(docx: Docx, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let file = File::create(path)
        .with_context(|| format!("failed to create document {}", path.display()))?;
    docx.build()
        .pack(file)
        .with_context(|| format!("failed to write document {}", path.display()))?;

    Ok(())
}

fn header_paragraph(page: &ReportPage) -> Paragraph {
    text_lines(Paragraph::new().align(AlignmentType::Center), &page.header_lines())
}

fn comparison_table(page: &ReportPage, image_width_in: f64) -> Table {
    let row = TableRow::new(vec![
        table_cell(&page.generated, image_width_in),
        table_cell(&page.ground_truth, image_width_in),
    ]);
    Table::new(vec![row]).set_grid(vec![COLUMN_WIDTH_TWIPS, COLUMN_WIDTH_TWIPS])
}

fn table_cell(cell: &ReportCell, image_width_in: f64) -> TableCell {
    let caption = Paragraph::new().add_run(Run::new().add_text(cell.caption));

    let content = match &cell.content {
        CellContent::Image(image) => {
            let (width_emu, height_emu) =
                scaled_extent(image.width_px, image.height_px, image_width_in);
            let picture = Pic::new_with_dimensions(image.png.clone(), image.width_px, image.height_px)
                .size(width_emu, height_emu);
            Paragraph::new().add_run(Run::new().add_image(picture))
        }
        CellContent::Text(text) => {
            let lines = text.lines().map(str::to_string).collect::<Vec<_>>();
            text_lines(Paragraph::new(), &lines)
        }
    };

    TableCell::new().add_paragraph(caption).add_paragraph(content)
}

fn text_lines(mut paragraph: Paragraph, lines: &[String]) -> Paragraph {
    let last = lines.len().saturating_sub(1);
    for (index, line) in lines.iter().enumerate() {
        let mut run = Run::new().add_text(line);
        if index < last {
            run = run.add_break(BreakType::TextWrapping);
        }
        paragraph = paragraph.add_run(run);
    }
    paragraph
}

/// Fixed display width, height following the pixel aspect ratio.
pub(crate) fn scaled_extent(width_px: u32, height_px: u32, width_in: f64) -> (u32, u32) {
    let width_emu = (width_in * EMU_PER_INCH).round();
    let height_emu = if width_px == 0 {
        width_emu
    } else {
        (width_emu * f64::from(height_px) / f64::from(width_px)).round()
    };
    (width_emu as u32, height_emu as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_extent_keeps_aspect_ratio() {
        assert_eq!(scaled_extent(10, 10, 4.0), (3_657_600, 3_657_600));
        assert_eq!(scaled_extent(200, 100, 4.0), (3_657_600, 1_828_800));
        assert_eq!(scaled_extent(0, 0, 1.0), (914_400, 914_400));
    }
}
