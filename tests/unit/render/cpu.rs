use super::*;

const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

fn font_opts() -> Option<CpuSurfaceOpts> {
    let path = std::env::var_os("SLIDEREEL_TEST_FONT")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from(SYSTEM_FONT));
    if !path.is_file() {
        eprintln!("skipping: no test font at {}", path.display());
        return None;
    }
    Some(CpuSurfaceOpts::from_font_path(&path).unwrap())
}

fn px(frame: &FrameRGBA, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * frame.width + x) * 4) as usize;
    [
        frame.data[i],
        frame.data[i + 1],
        frame.data[i + 2],
        frame.data[i + 3],
    ]
}

#[test]
fn missing_font_is_setup_error() {
    let err = CpuSurfaceOpts::from_font_path(Path::new("target/no/such/font.ttf")).unwrap_err();
    assert!(matches!(err, ReelError::Setup(_)));
}

#[test]
fn garbage_font_bytes_are_rejected() {
    let opts = CpuSurfaceOpts::from_font_bytes(b"not a font at all".to_vec());
    let err = CpuSurface::new(
        Canvas {
            width: 16,
            height: 16,
        },
        opts,
    )
    .unwrap_err();
    assert!(matches!(err, ReelError::Setup(_)));
}

#[test]
fn premul_pixmap_checks_byte_length() {
    assert!(premul_bytes_to_pixmap(&[0; 12], 2, 2).is_err());
    assert!(premul_bytes_to_pixmap(&[255; 16], 2, 2).is_ok());
}

#[test]
fn clear_and_fill_rect_land_in_snapshot() {
    let Some(opts) = font_opts() else { return };
    let canvas = Canvas {
        width: 32,
        height: 16,
    };
    let mut s = CpuSurface::new(canvas, opts).unwrap();
    s.clear(Rgba8::opaque(0, 0, 255));
    s.fill_rect(Rect::new(0.0, 0.0, 16.0, 16.0), Rgba8::opaque(255, 0, 0));
    let frame = s.snapshot().unwrap();

    assert!(frame.premultiplied);
    assert_eq!(frame.data.len(), canvas.rgba_len());
    assert_eq!(px(&frame, 4, 8), [255, 0, 0, 255]);
    assert_eq!(px(&frame, 28, 8), [0, 0, 255, 255]);
}

#[test]
fn text_is_measured_and_drawn() {
    let Some(opts) = font_opts() else { return };
    let mut s = CpuSurface::new(
        Canvas {
            width: 64,
            height: 32,
        },
        opts,
    )
    .unwrap();

    let short = s.measure_text("Hi", 16.0);
    let long = s.measure_text("Hi there", 16.0);
    assert!(short > 0.0);
    assert!(long > short);
    assert_eq!(s.measure_text("", 16.0), 0.0);

    s.clear(Rgba8::WHITE);
    s.fill_text(
        "Hi",
        Point::new(32.0, 4.0),
        16.0,
        Rgba8::BLACK,
        TextAlign::Center,
    )
    .unwrap();
    let frame = s.snapshot().unwrap();
    assert!(
        frame.data.chunks_exact(4).any(|p| p[0] < 128),
        "expected dark glyph pixels"
    );
}

#[test]
fn image_is_scaled_into_rect() {
    let Some(opts) = font_opts() else { return };
    let mut s = CpuSurface::new(
        Canvas {
            width: 16,
            height: 16,
        },
        opts,
    )
    .unwrap();
    let img = PreparedImage {
        width: 1,
        height: 1,
        rgba8_premul: Arc::new(vec![0, 255, 0, 255]),
    };

    s.clear(Rgba8::WHITE);
    s.draw_image(Rect::new(0.0, 0.0, 8.0, 16.0), &img).unwrap();
    let frame = s.snapshot().unwrap();
    assert_eq!(px(&frame, 3, 8), [0, 255, 0, 255]);
    assert_eq!(px(&frame, 12, 8), [255, 255, 255, 255]);
}
