use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

use image::{ImageFormat, Rgba, RgbaImage};
use tempfile::tempdir;

use super::dds::tests::write_dxt1;
use super::imagelib::tests::{gradient, open_any};
use super::jpeg::tests::jpeg_bytes;
use super::memory::FixedMemory;
use super::texture::{MemoryDevice, TextureFormat};
use super::*;

fn picture_in(dir: &Path) -> Picture {
    Picture::new(AppConfig {
        cache_dir: dir.join("cache"),
        ..AppConfig::default()
    })
    .with_memory_probe(FixedMemory(Some(512)))
}

fn s(p: &Path) -> &str {
    p.to_str().unwrap()
}

/// Serve `body` once on a loopback port; returns a url ending in `name`.
fn serve_once(body: Vec<u8>, name: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    format!("http://{addr}/art/{name}")
}

fn png_bytes(img: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

#[test]
fn generic_load_flips_rows_into_bgra() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("icon.png");
    let mut img = RgbaImage::from_pixel(5, 3, Rgba([0, 0, 0, 255]));
    img.put_pixel(0, 0, Rgba([10, 20, 30, 128]));
    img.save(&src).unwrap();

    let mut pic = picture_in(dir.path());
    let mut device = MemoryDevice::default();
    let tex = pic.load(&mut device, s(&src), 0, 0).unwrap();

    assert_eq!((tex.width, tex.height), (5, 3));
    assert_eq!(tex.format, TextureFormat::LinA8R8G8B8);
    assert_eq!(tex.pixel(0, 0), Some([30, 20, 10, 128]));
    assert_eq!(tex.pixel(4, 2), Some([0, 0, 0, 255]));
    assert_eq!(
        *pic.info(),
        ImageInfo {
            width: 5,
            height: 3,
            original_width: 5,
            original_height: 3
        }
    );
}

#[test]
fn opaque_images_get_default_alpha() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("rgb.bmp");
    image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255])))
        .to_rgb8()
        .save(&src)
        .unwrap();

    let mut pic = picture_in(dir.path());
    let tex = pic.load(&mut MemoryDevice::default(), s(&src), 0, 0).unwrap();
    assert_eq!(tex.pixel(1, 1), Some([3, 2, 1, 0xff]));
}

#[test]
fn jpeg_path_pads_texture_to_multiples_of_four() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("photo.jpg");
    fs::write(&src, jpeg_bytes(&gradient(10, 6))).unwrap();

    let mut pic = picture_in(dir.path());
    let tex = pic.load(&mut MemoryDevice::default(), s(&src), 0, 0).unwrap();
    assert_eq!((tex.width, tex.height), (12, 8));
    assert_eq!((pic.info().width, pic.info().height), (10, 6));
    assert_eq!(pic.info().original_width, 10);
}

#[test]
fn low_memory_skips_the_jpeg_decoder() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("photo.jpg");
    fs::write(&src, jpeg_bytes(&gradient(10, 6))).unwrap();

    let mut pic = picture_in(dir.path()).with_memory_probe(FixedMemory(Some(4)));
    let tex = pic.load(&mut MemoryDevice::default(), s(&src), 0, 0).unwrap();
    // the image library allocates the exact size
    assert_eq!((tex.width, tex.height), (10, 6));
}

#[test]
fn jpeg_load_honours_requested_bounds() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("big.jpg");
    fs::write(&src, jpeg_bytes(&gradient(640, 480))).unwrap();

    let mut pic = picture_in(dir.path());
    let tex = pic.load(&mut MemoryDevice::default(), s(&src), 160, 120).unwrap();
    assert_eq!((tex.width, tex.height), (160, 120));
    assert_eq!(
        (pic.info().original_width, pic.info().original_height),
        (640, 480)
    );
}

#[test]
fn mislabelled_tbn_falls_back_to_image_library() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("cover.tbn");
    fs::write(&src, png_bytes(&gradient(7, 7))).unwrap();

    let mut pic = picture_in(dir.path());
    let tex = pic.load(&mut MemoryDevice::default(), s(&src), 0, 0).unwrap();
    assert_eq!((tex.width, tex.height), (7, 7));
}

#[test]
fn missing_files_do_not_load() {
    let dir = tempdir().unwrap();
    let mut pic = picture_in(dir.path());
    let mut device = MemoryDevice::default();
    assert!(pic
        .load(&mut device, s(&dir.path().join("nope.jpg")), 0, 0)
        .is_none());
    assert!(pic
        .load(&mut device, s(&dir.path().join("nope.png")), 0, 0)
        .is_none());
    assert_eq!(*pic.info(), ImageInfo::default());
}

#[test]
fn jpeg_allocation_failure_does_not_fall_back() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("poster.jpg");
    fs::write(&src, jpeg_bytes(&gradient(100, 100))).unwrap();
    let mut pic = picture_in(dir.path());

    // DCT scaling stops at 50x50 (52x52 padded); the image library would fit 30x30
    assert!(pic
        .load(&mut MemoryDevice::with_max_dimension(32), s(&src), 30, 30)
        .is_none());
    assert_eq!(
        *pic.info(),
        ImageInfo {
            width: 50,
            height: 50,
            original_width: 100,
            original_height: 100
        }
    );

    let tex = pic
        .load(&mut MemoryDevice::with_max_dimension(64), s(&src), 30, 30)
        .unwrap();
    assert_eq!((tex.width, tex.height), (52, 52));
}

#[test]
fn jpeg_decode_failure_does_not_fall_back() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("broken.jpg");
    let mut bytes = jpeg_bytes(&gradient(64, 64));
    // walk the marker segments up to the start of scan, keep a few bytes of scan data
    let mut at = 2;
    loop {
        let len = u16::from_be_bytes([bytes[at + 2], bytes[at + 3]]) as usize;
        if bytes[at + 1] == 0xda {
            bytes.truncate(at + 2 + len + 16);
            break;
        }
        at += 2 + len;
    }
    fs::write(&src, &bytes).unwrap();

    let mut pic = picture_in(dir.path());
    assert!(pic
        .load(&mut MemoryDevice::default(), s(&src), 0, 0)
        .is_none());
    // the image library resets the info before decoding; the header sizes survive
    assert_eq!(
        (pic.info().original_width, pic.info().original_height),
        (64, 64)
    );
}

#[test]
fn dds_sidecar_wins_when_enabled() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("fanart.jpg");
    fs::write(&src, jpeg_bytes(&gradient(60, 30))).unwrap();
    write_dxt1(&dir.path().join("fanart.dds"), 64, 32, (60, 30), 0x5a);

    let mut enabled = Picture::new(AppConfig {
        cache_dir: dir.path().join("cache"),
        use_dds_fanart: true,
        ..AppConfig::default()
    });
    let tex = enabled
        .load(&mut MemoryDevice::default(), s(&src), 0, 0)
        .unwrap();
    assert_eq!(tex.format, TextureFormat::Dxt1);
    assert_eq!((tex.width, tex.height), (64, 32));
    assert!(tex.pixels.iter().all(|&b| b == 0x5a));
    assert_eq!((enabled.info().width, enabled.info().height), (60, 30));

    let mut disabled = picture_in(dir.path());
    let tex = disabled
        .load(&mut MemoryDevice::default(), s(&src), 0, 0)
        .unwrap();
    assert_eq!(tex.format, TextureFormat::LinA8R8G8B8);
}

#[test]
fn dds_allocation_failure_falls_through() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("fanart.jpg");
    fs::write(&src, jpeg_bytes(&gradient(16, 16))).unwrap();
    write_dxt1(&dir.path().join("fanart.dds"), 64, 64, (0, 0), 0);

    let mut pic = Picture::new(AppConfig {
        cache_dir: dir.path().join("cache"),
        use_dds_fanart: true,
        ..AppConfig::default()
    })
    .with_memory_probe(FixedMemory(Some(512)));
    let tex = pic
        .load(&mut MemoryDevice::with_max_dimension(32), s(&src), 0, 0)
        .unwrap();
    assert_eq!(tex.format, TextureFormat::LinA8R8G8B8);
    assert_eq!((tex.width, tex.height), (16, 16));
}

#[test]
fn existing_thumbnail_is_kept_when_checked() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("a.png");
    gradient(300, 300).save(&src).unwrap();
    let thumb = dir.path().join("a.tbn");
    fs::write(&thumb, b"already here").unwrap();

    let pic = picture_in(dir.path());
    assert!(pic.create_thumbnail(s(&src), s(&thumb), true));
    assert_eq!(fs::read(&thumb).unwrap(), b"already here");

    assert!(pic.create_thumbnail(s(&src), s(&thumb), false));
    let regenerated = open_any(&thumb);
    assert_eq!((regenerated.width(), regenerated.height()), (256, 256));
}

#[test]
fn zero_size_caching_copies_bytes() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("raw.png");
    let bytes = png_bytes(&gradient(9, 9));
    fs::write(&src, &bytes).unwrap();
    let dest = dir.path().join("copy").join("raw.png");

    let pic = picture_in(dir.path());
    assert!(pic.cache_image(s(&src), s(&dest), 0, 0));
    assert_eq!(fs::read(&dest).unwrap(), bytes);
    assert!(!pic.cache_image(s(&dir.path().join("gone.png")), s(&dest), 0, 0));
}

#[test]
fn fanart_uses_sixteen_by_nine_box() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("backdrop.png");
    gradient(1920, 1080).save(&src).unwrap();
    let dest = dir.path().join("backdrop.tbn");

    let pic = picture_in(dir.path());
    assert!(pic.cache_fanart(s(&src), s(&dest)));
    let out = open_any(&dest);
    assert_eq!((out.width(), out.height()), (1280, 720));
}

#[test]
fn cache_thumb_writes_through_special_paths() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("poster.jpg");
    fs::write(&src, jpeg_bytes(&gradient(512, 768))).unwrap();

    let pic = picture_in(dir.path());
    assert!(pic.cache_thumb(s(&src), "special://thumbs/p/poster.tbn"));
    let out = open_any(&pic.dirs().thumbs_dir().join("p").join("poster.tbn"));
    assert_eq!((out.width(), out.height()), (171, 256));
}

#[test]
fn remote_sources_go_through_a_deleted_temp_file() {
    let dir = tempdir().unwrap();
    let url = serve_once(png_bytes(&gradient(400, 200)), "poster.png");
    let dest = dir.path().join("remote.tbn");

    let pic = picture_in(dir.path());
    assert!(pic.cache_image(&url, s(&dest), 100, 100));

    let out = open_any(&dest);
    assert_eq!((out.width(), out.height()), (100, 50));
    assert!(!pic.dirs().temp_path_for_url(&url).exists());
    assert_eq!(fs::read_dir(pic.dirs().temp_dir()).unwrap().count(), 0);
}

#[test]
fn failed_downloads_report_false() {
    let dir = tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/missing.jpg", listener.local_addr().unwrap());
    drop(listener);

    let pic = picture_in(dir.path());
    assert!(!pic.cache_thumb(&url, s(&dir.path().join("x.tbn"))));
    assert!(!pic.cache_thumb("ftp://nas/poster.jpg", s(&dir.path().join("y.tbn"))));
}

#[test]
fn memory_thumbnails_for_jpeg_and_png() {
    let dir = tempdir().unwrap();
    let pic = picture_in(dir.path());

    let jpg_dest = dir.path().join("album-jpg.tbn");
    assert!(pic.create_thumbnail_from_memory(&jpeg_bytes(&gradient(512, 512)), "jpg", s(&jpg_dest)));
    let out = open_any(&jpg_dest);
    assert_eq!((out.width(), out.height()), (256, 256));

    let png_dest = dir.path().join("album-png.tbn");
    assert!(pic.create_thumbnail_from_memory(&png_bytes(&gradient(64, 32)), "png", s(&png_dest)));
    let out = open_any(&png_dest);
    assert_eq!((out.width(), out.height()), (64, 32));

    assert!(!pic.create_thumbnail_from_memory(b"garbage", "jpg", s(&dir.path().join("bad.tbn"))));
}

#[test]
fn folder_thumb_caches_each_source_first() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.jpg");
    gradient(100, 100).save(&a).unwrap();
    fs::write(&b, jpeg_bytes(&gradient(100, 50))).unwrap();

    let pic = picture_in(dir.path());
    let thumbs: FolderThumbs = [
        s(&a).to_string(),
        String::new(),
        s(&b).to_string(),
        String::new(),
    ];
    let folder = dir.path().join("folder.tbn");
    assert!(pic.create_folder_thumb(&thumbs, s(&folder)));

    assert!(pic.dirs().cached_picture_thumb(s(&a)).exists());
    assert!(pic.dirs().cached_picture_thumb(s(&b)).exists());
    let out = open_any(&folder);
    assert_eq!((out.width(), out.height()), (256, 256));

    let empty: FolderThumbs = Default::default();
    assert!(!pic.create_folder_thumb(&empty, s(&dir.path().join("none.tbn"))));
}

#[test]
fn surface_thumbnails() {
    let dir = tempdir().unwrap();
    let pic = picture_in(dir.path());
    let surface = vec![0x40u8; 8 * 4 * 4];

    assert!(!pic.create_thumbnail_from_surface(&[], 8, 4, 32, s(&dir.path().join("e.jpg"))));

    let jpg = dir.path().join("shot.jpg");
    assert!(pic.create_thumbnail_from_surface(&surface, 8, 4, 32, s(&jpg)));
    assert_eq!(
        image::guess_format(&fs::read(&jpg).unwrap()).unwrap(),
        ImageFormat::Jpeg
    );

    let png = dir.path().join("shot.png");
    assert!(pic.create_thumbnail_from_surface(&surface, 8, 4, 32, s(&png)));
    assert_eq!(
        image::guess_format(&fs::read(&png).unwrap()).unwrap(),
        ImageFormat::Png
    );
}

#[test]
fn convert_reports_error_codes() {
    let dir = tempdir().unwrap();
    let pic = picture_in(dir.path());
    let src = dir.path().join("in.png");
    gradient(40, 20).save(&src).unwrap();

    let out = dir.path().join("out.jpg");
    pic.convert_file(s(&src), s(&out), 270.0, 10, 10, 80, false)
        .unwrap();
    let img = image::open(&out).unwrap();
    assert_eq!((img.width(), img.height()), (5, 10));

    let err = pic
        .convert_file(s(&dir.path().join("none.png")), s(&out), 0.0, 0, 0, 0, false)
        .unwrap_err();
    assert_eq!(err.code(), 2);
}

#[test]
fn skin_images_are_thumbnailed_from_their_surface() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("button.png");
    RgbaImage::from_pixel(6, 5, Rgba([0, 128, 255, 255]))
        .save(&src)
        .unwrap();
    let dest = dir.path().join("button-thumb.png");

    let mut pic = picture_in(dir.path());
    assert!(pic.cache_skin_image(s(&src), s(&dest)));
    let out = image::open(&dest).unwrap().to_rgba8();
    assert_eq!(out.dimensions(), (6, 5));
    assert_eq!(out.get_pixel(2, 2).0, [0, 128, 255, 255]);

    assert!(!pic.cache_skin_image(s(&dir.path().join("nope.png")), s(&dest)));
}

#[test]
fn skin_images_from_dds_are_cropped() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("skin.jpg");
    fs::write(&src, jpeg_bytes(&gradient(12, 10))).unwrap();
    write_dxt1(&dir.path().join("skin.dds"), 16, 16, (12, 10), 0);
    let dest = dir.path().join("skin.png");

    let mut pic = Picture::new(AppConfig {
        cache_dir: dir.path().join("cache"),
        use_dds_fanart: true,
        ..AppConfig::default()
    });
    assert!(pic.cache_skin_image(s(&src), s(&dest)));
    let out = open_any(&dest);
    assert_eq!((out.width(), out.height()), (12, 10));
}

#[test]
fn clean_temp_removes_partials() {
    let dir = tempdir().unwrap();
    let pic = picture_in(dir.path());
    fs::write(pic.dirs().temp_dir().join("1234abcd.jpg.part"), b"x").unwrap();
    assert_eq!(pic.clean_temp(), 1);
    assert_eq!(pic.clean_temp(), 0);
}

#[test]
fn texture_allocation_failure_is_typed() {
    let mut device = MemoryDevice::with_max_dimension(8);
    let err = create_texture(&mut device, 16, 4, TextureFormat::LinA8R8G8B8).unwrap_err();
    assert!(matches!(err, PictureError::Texture { width: 16, height: 4 }));
    assert_eq!(err.code(), 7);
    assert!(create_texture(&mut device, 8, 8, TextureFormat::Dxt1).is_ok());
}
