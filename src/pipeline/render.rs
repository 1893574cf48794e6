use std::path::Path;
use std::time::Instant;

use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};

use crate::error::{AppError, AppResult};
use crate::telemetry::metrics::RENDER_DURATION;

use super::aggregate::SummaryTable;
use super::report::cell_rows;

pub const DPI: u32 = 200;

const FIGURE_WIDTH: u32 = 1280; // 6.4in
const FIGURE_HEIGHT: u32 = 960; // 4.8in
const MARGIN: u32 = 64;

/// Tables that need more room shrink their text, and fail past this multiple.
const MAX_FIGURE_SCALE: u32 = 3;
const MAX_WIDTH: u32 = FIGURE_WIDTH * MAX_FIGURE_SCALE;
const MAX_HEIGHT: u32 = FIGURE_HEIGHT * MAX_FIGURE_SCALE;

const GLYPH: u32 = 8;
const CELL_SCALE: u32 = 3; // ~8pt
const TITLE_SCALE: u32 = 4; // ~12pt
const TITLE_PAD: u32 = 33;
const CELL_PADDING: u32 = 10;
const ROW_SCALE: f64 = 1.2;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    width: u32,
    height: u32,
    col_width: u32,
    row_height: u32,
    cell_scale: u32,
    cell_padding: u32,
    table_left: u32,
    table_top: u32,
    title_top: u32,
}

fn glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH * scale
}

fn draw_text(image: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32) {
    for (i, c) in text.chars().enumerate() {
        let origin_x = x + i as u32 * GLYPH * scale;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH {
                if bits & (1 << col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = origin_x + col * scale + dx;
                        let py = y + row as u32 * scale + dy;
                        if px < image.width() && py < image.height() {
                            image.put_pixel(px, py, BLACK);
                        }
                    }
                }
            }
        }
    }
}

fn draw_cell_border(image: &mut RgbImage, x: u32, y: u32, width: u32, height: u32) {
    let right = (x + width).min(image.width() - 1);
    let bottom = (y + height).min(image.height() - 1);
    for px in x..=right {
        image.put_pixel(px, y, BLACK);
        image.put_pixel(px, bottom, BLACK);
    }
    for py in y..=bottom {
        image.put_pixel(x, py, BLACK);
        image.put_pixel(right, py, BLACK);
    }
}

fn layout_at(headers: &[&str], cells: &[Vec<String>], title: &str, scale: u32) -> Option<Layout> {
    let columns = headers.len() as u32;
    let padding = CELL_PADDING * scale / CELL_SCALE;

    let needed = headers
        .iter()
        .map(|h| text_width(h, scale))
        .chain(cells.iter().flatten().map(|c| text_width(c, scale)))
        .max()
        .unwrap_or(0)
        + 2 * padding;
    let col_width = ((FIGURE_WIDTH - 2 * MARGIN) / columns).max(needed);
    let table_width = col_width.checked_mul(columns)?;

    let row_height = (f64::from(GLYPH * scale + 2 * padding) * ROW_SCALE).round() as u32;
    let rows = u32::try_from(cells.len()).ok()?.checked_add(1)?;
    let table_height = row_height.checked_mul(rows)?;

    let title_height = if title.is_empty() {
        0
    } else {
        GLYPH * TITLE_SCALE + TITLE_PAD
    };
    let content_height = title_height + table_height;

    let width = FIGURE_WIDTH
        .max(table_width.saturating_add(2 * MARGIN))
        .max(text_width(title, TITLE_SCALE) + 2 * MARGIN);
    let height = FIGURE_HEIGHT.max(content_height.saturating_add(2 * MARGIN));
    if width > MAX_WIDTH || height > MAX_HEIGHT {
        return None;
    }

    let title_top = (height - content_height) / 2;

    Some(Layout {
        width,
        height,
        col_width,
        row_height,
        cell_scale: scale,
        cell_padding: padding,
        table_left: (width - table_width) / 2,
        table_top: title_top + title_height,
        title_top,
    })
}

/// Largest text scale whose table fits within `MAX_WIDTH` x `MAX_HEIGHT`.
fn layout(headers: &[&str], cells: &[Vec<String>], title: &str) -> AppResult<Layout> {
    (1..=CELL_SCALE)
        .rev()
        .find_map(|scale| layout_at(headers, cells, title, scale))
        .ok_or_else(|| {
            AppError::Render(format!(
                "table of {} rows does not fit within {MAX_WIDTH}x{MAX_HEIGHT} pixels",
                cells.len()
            ))
        })
}

/// Rasterizes a summary as a centered table with an optional title above it.
pub fn render_table(table: &SummaryTable, title: Option<&str>) -> AppResult<RgbImage> {
    if table.is_empty() {
        return Err(AppError::Render(format!(
            "{} summary has no rows",
            table.value_column
        )));
    }

    let headers = table.columns();
    let cells = cell_rows(table)?;
    let title = title.unwrap_or("");
    let layout = layout(&headers, &cells, title)?;

    let mut image = RgbImage::from_pixel(layout.width, layout.height, WHITE);

    if !title.is_empty() {
        let x = (layout.width - text_width(title, TITLE_SCALE)) / 2;
        draw_text(&mut image, x, layout.title_top, title, TITLE_SCALE);
    }

    let scale = layout.cell_scale;
    let text_offset = (layout.row_height - GLYPH * scale) / 2;
    let header_row = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();

    for (r, row) in std::iter::once(&header_row).chain(cells.iter()).enumerate() {
        let y = layout.table_top + r as u32 * layout.row_height;
        for (c, text) in row.iter().enumerate() {
            let x = layout.table_left + c as u32 * layout.col_width;
            draw_cell_border(&mut image, x, y, layout.col_width, layout.row_height);

            let w = text_width(text, scale);
            // headers centered, body right-aligned
            let text_x = if r == 0 {
                x + (layout.col_width - w) / 2
            } else {
                x + layout.col_width - layout.cell_padding - w
            };
            draw_text(&mut image, text_x, y + text_offset, text, scale);
        }
    }

    Ok(image)
}

pub(crate) fn encode_png(image: &RgbImage) -> AppResult<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, image.width(), image.height());
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);

        let pixels_per_meter = (f64::from(DPI) / 0.0254).round() as u32;
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: pixels_per_meter,
            yppu: pixels_per_meter,
            unit: png::Unit::Meter,
        }));

        let mut writer = encoder.write_header()?;
        writer.write_image_data(image.as_raw())?;
        writer.finish()?;
    }
    Ok(bytes)
}

/// Renders `table` and writes it to `out_path`, replacing any existing file.
#[tracing::instrument(
    name = "pipeline_stage render",
    skip(table, out_path),
    fields(
        pipeline.stage = "render",
        render.path = %out_path.display(),
        render.width,
        render.height,
    )
)]
pub fn save_table_image(
    table: &SummaryTable,
    out_path: &Path,
    title: Option<&str>,
) -> AppResult<()> {
    let start = Instant::now();

    let image = render_table(table, title)?;
    let bytes = encode_png(&image)?;
    std::fs::write(out_path, bytes)?;

    let span = tracing::Span::current();
    span.record("render.width", image.width());
    span.record("render.height", image.height());

    RENDER_DURATION.record(start.elapsed().as_secs_f64() * 1000.0, &[]);
    tracing::info!(path = %out_path.display(), "Summary image written");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::{AggregateFn, Aggregation, SortKey, SortOrder, aggregate};
    use crate::supabase::Record;

    fn table(tiers: &[(&str, f64)]) -> SummaryTable {
        let records: Vec<Record> = tiers
            .iter()
            .map(|(tier, price)| {
                serde_json::from_value(serde_json::json!({"fan_tier": tier, "price": price}))
                    .unwrap()
            })
            .collect();
        let aggregation = Aggregation {
            group_by: &["fan_tier"],
            value_field: "price",
            function: AggregateFn::Mean,
            output_column: "avg_price",
            sort: &[SortKey::Value(SortOrder::Descending)],
        };
        aggregate(&records, &aggregation).unwrap()
    }

    fn cells(rows: usize) -> Vec<Vec<String>> {
        (0..rows)
            .map(|i| vec![format!("event{i}"), "web".to_string(), format!("{i}")])
            .collect()
    }

    fn has_ink(image: &RgbImage) -> bool {
        image.pixels().any(|p| *p == BLACK)
    }

    #[test]
    fn test_small_table_uses_base_figure_size() {
        let image = render_table(&table(&[("gold", 150.0), ("silver", 50.0)]), None).unwrap();

        assert_eq!(image.dimensions(), (FIGURE_WIDTH, FIGURE_HEIGHT));
        assert_eq!(*image.get_pixel(0, 0), WHITE);
        assert!(has_ink(&image));
    }

    #[test]
    fn test_title_is_drawn_above_table() {
        let t = table(&[("gold", 150.0)]);
        let plain = render_table(&t, None).unwrap();
        let titled = render_table(&t, Some("Average Ticket Price by Fan Tier")).unwrap();

        assert_ne!(plain, titled);

        let headers = t.columns();
        let cells = cell_rows(&t).unwrap();
        let l = layout(&headers, &cells, "Average Ticket Price by Fan Tier").unwrap();
        let title_band_inked = (l.title_top..l.title_top + GLYPH * TITLE_SCALE)
            .any(|y| (0..l.width).any(|x| *titled.get_pixel(x, y) == BLACK));
        assert!(title_band_inked);
        assert!(l.table_top > l.title_top);
    }

    #[test]
    fn test_wide_cells_grow_canvas() {
        let long_tier = "x".repeat(80);
        let image = render_table(&table(&[(long_tier.as_str(), 1.0)]), None).unwrap();

        assert!(image.width() > FIGURE_WIDTH);
        assert_eq!(image.height(), FIGURE_HEIGHT);
    }

    #[test]
    fn test_many_rows_grow_canvas() {
        let tiers: Vec<String> = (0..40).map(|i| format!("tier{i}")).collect();
        let rows: Vec<(&str, f64)> = tiers.iter().map(|t| (t.as_str(), 1.0)).collect();
        let image = render_table(&table(&rows), None).unwrap();

        assert!(image.height() > FIGURE_HEIGHT);
        assert!(image.height() <= MAX_HEIGHT);
    }

    #[test]
    fn test_crowded_table_shrinks_text_within_cap() {
        let headers = ["event", "purchase_channel", "total_revenue"];

        let roomy = layout(&headers, &cells(10), "").unwrap();
        assert_eq!(roomy.cell_scale, CELL_SCALE);

        let crowded = layout(&headers, &cells(150), "").unwrap();
        assert!(crowded.cell_scale < CELL_SCALE);
        assert!(crowded.width <= MAX_WIDTH);
        assert!(crowded.height <= MAX_HEIGHT);
    }

    #[test]
    fn test_oversized_table_is_rejected() {
        let headers = ["event", "purchase_channel", "total_revenue"];

        for rows in [1_000, 20_000] {
            let err = layout(&headers, &cells(rows), "").unwrap_err();
            assert!(matches!(err, AppError::Render(_)));
        }
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let err = render_table(&table(&[]), None).unwrap_err();
        assert!(matches!(err, AppError::Render(_)));
    }

    #[test]
    fn test_unknown_glyph_falls_back() {
        assert_eq!(glyph('€'), glyph('?'));
        assert_ne!(glyph('é'), glyph('?'));
        assert_eq!(glyph(' '), [0; 8]);
    }

    #[test]
    fn test_png_declares_dpi() {
        let image = render_table(&table(&[("gold", 1.0)]), None).unwrap();
        let bytes = encode_png(&image).unwrap();

        let decoder = png::Decoder::new(std::io::Cursor::new(bytes));
        let reader = decoder.read_info().unwrap();
        let info = reader.info();

        assert_eq!((info.width, info.height), (FIGURE_WIDTH, FIGURE_HEIGHT));
        let dims = info.pixel_dims.unwrap();
        assert_eq!(dims.unit, png::Unit::Meter);
        assert_eq!(dims.xppu, 7874);
    }

    #[test]
    fn test_save_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avg_price_by_tier.png");

        let long_tier = "y".repeat(80);
        save_table_image(&table(&[(long_tier.as_str(), 1.0)]), &path, Some("first")).unwrap();
        let first = image::open(&path).unwrap().to_rgb8();
        assert!(first.width() > FIGURE_WIDTH);

        let small = table(&[("gold", 150.0)]);
        save_table_image(&small, &path, Some("second")).unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        let expected = encode_png(&render_table(&small, Some("second")).unwrap()).unwrap();
        assert_eq!(on_disk, expected);

        let second = image::open(&path).unwrap().to_rgb8();
        assert_eq!(second.dimensions(), (FIGURE_WIDTH, FIGURE_HEIGHT));
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.png");

        let err = save_table_image(&table(&[("gold", 1.0)]), &path, None).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }
}
