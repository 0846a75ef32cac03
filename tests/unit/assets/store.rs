use std::io::Cursor;

use super::*;

fn png_bytes(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(px));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn normalize_path_slash_normalization() {
    assert_eq!(normalize_rel_path("a/b.png").unwrap(), "a/b.png");
    assert_eq!(normalize_rel_path("a\\b.png").unwrap(), "a/b.png");
    assert_eq!(normalize_rel_path("./a//b.png").unwrap(), "a/b.png");
    assert!(normalize_rel_path("../x.png").is_err());
    assert!(normalize_rel_path("/abs.png").is_err());
    assert!(normalize_rel_path("./").is_err());
}

#[test]
fn decode_image_png_dimensions_and_premul() {
    let prepared = decode_image(&png_bytes(1, 1, [100, 50, 200, 128])).unwrap();
    assert_eq!(prepared.width, 1);
    assert_eq!(prepared.height, 1);
    assert_eq!(
        prepared.rgba8_premul.as_slice(),
        &[
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            ((200u16 * 128 + 127) / 255) as u8,
            128u8
        ]
    );
}

#[test]
fn decode_rejects_garbage() {
    assert!(decode_image(b"not an image").is_err());
}

#[test]
fn store_loads_once_and_degrades_missing_to_none() {
    let root = std::path::PathBuf::from("target").join("unit_image_store");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("dot.png"), png_bytes(2, 3, [255, 0, 0, 255])).unwrap();

    let mut store = ImageStore::new(&root);
    let a = store.image("dot.png").expect("image present");
    assert_eq!((a.width, a.height), (2, 3));
    let b = store.image("dot.png").expect("cached");
    assert!(Arc::ptr_eq(&a, &b));

    assert!(store.image("missing.png").is_none());
    assert!(store.image("../escape.png").is_none());
    assert!(store.load("missing.png").is_err());
}

#[test]
fn no_images_is_always_empty() {
    assert!(NoImages.image("anything.png").is_none());
}
