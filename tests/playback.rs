use std::{io::Cursor, sync::Arc, time::Duration};

use slidecast::{
    CancellationToken, Canvas, Encoder, ExportSettings, HeadlessFullscreen, ImageInput,
    MemoryCapture, MemorySink, SlideshowConfig, SlideshowView, Theme,
};
use tokio::time::Instant;

fn png(rgba: [u8; 4]) -> ImageInput {
    let img = image::RgbaImage::from_pixel(6, 6, image::Rgba(rgba));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    ImageInput::new("image/png", buf)
}

fn view() -> SlideshowView {
    SlideshowView::new(
        vec![png([255, 255, 255, 255]), png([0, 0, 0, 255])],
        SlideshowConfig::new("Two Slides", Theme::Calm),
        ExportSettings {
            canvas: Canvas::new(16, 10).unwrap(),
            ..ExportSettings::default()
        },
        None,
        Arc::new(HeadlessFullscreen::new()),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn slides_advance_every_five_seconds_and_wrap() {
    let mut v = view();
    let start = Instant::now();
    assert_eq!(v.advance().await, 1);
    assert_eq!(start.elapsed(), Duration::from_millis(5_000));
    assert_eq!(v.advance().await, 0);
    assert_eq!(start.elapsed(), Duration::from_millis(10_000));
    v.teardown();
}

#[tokio::test(start_paused = true)]
async fn manual_navigation_restarts_the_period() {
    let mut v = view();
    let start = Instant::now();
    tokio::time::sleep(Duration::from_millis(3_000)).await;
    assert_eq!(v.next(), 1);
    assert_eq!(v.advance().await, 0);
    assert_eq!(start.elapsed(), Duration::from_millis(8_000));
}

#[tokio::test(start_paused = true)]
async fn export_pauses_playback_until_it_finishes() {
    let mut v = view();
    let exporter = v.exporter();
    let request = v.export_request();
    let sink = MemorySink::new();
    let start = Instant::now();

    let (outcome, shown) = tokio::join!(
        exporter.export(
            request,
            Encoder::StreamCaptured(Box::new(MemoryCapture::new())),
            &sink,
            CancellationToken::new(),
        ),
        v.advance(),
    );

    assert!(outcome.is_ok());
    assert_eq!(shown, 1);
    // Two 5 s slides are captured in real time, then a full period elapses after resume.
    assert_eq!(start.elapsed(), Duration::from_millis(15_000));
}

#[tokio::test(start_paused = true)]
async fn export_without_a_waiting_viewer_still_restarts_the_period() {
    let mut v = view();
    tokio::time::sleep(Duration::from_secs(1)).await;
    v.export(
        Encoder::StreamCaptured(Box::new(MemoryCapture::new())),
        &MemorySink::new(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let start = Instant::now();
    assert_eq!(v.advance().await, 1);
    assert_eq!(start.elapsed(), Duration::from_millis(5_000));
}
