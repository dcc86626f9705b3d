use std::{io::Cursor, sync::Arc, time::Duration};

use image::AnimationDecoder as _;
use serde_json::json;
use slidecast::{
    CancellationToken, Canvas, Encoder, ExportOutcome, ExportRequest, ExportSettings,
    ExportStatus, HeadlessFullscreen, ImageInput, Language, MemoryCapture, MemoryFrames,
    MemorySink, OutputFormat, SlidecastError, SlideshowConfig, SlideshowView, Theme,
};

fn png(rgba: [u8; 4]) -> ImageInput {
    let img = image::RgbaImage::from_pixel(12, 8, image::Rgba(rgba));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    ImageInput::new("image/png", buf)
}

fn three_images() -> Vec<ImageInput> {
    vec![
        png([220, 40, 40, 255]),
        png([40, 220, 40, 255]),
        png([40, 40, 220, 255]),
    ]
}

fn settings() -> ExportSettings {
    ExportSettings {
        canvas: Canvas::new(32, 18).unwrap(),
        ..ExportSettings::default()
    }
}

fn view(images: Vec<ImageInput>, config: SlideshowConfig) -> SlideshowView {
    SlideshowView::new(
        images,
        config,
        settings(),
        None,
        Arc::new(HeadlessFullscreen::new()),
    )
    .unwrap()
}

fn summer_trip() -> SlideshowConfig {
    SlideshowConfig::new("Summer Trip", Theme::Energetic)
}

#[tokio::test(start_paused = true)]
async fn gif_export_matches_playback_timing() {
    let v = view(three_images(), summer_trip());
    let sink = MemorySink::new();

    let outcome = v
        .export(Encoder::gif(), &sink, CancellationToken::new())
        .await
        .unwrap();
    let ExportOutcome::Completed {
        filename,
        format,
        duration_ms,
        frames,
        ..
    } = outcome
    else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert_eq!(filename, "summer_trip.gif");
    assert_eq!(format, OutputFormat::Gif);
    assert_eq!(duration_ms, 15_000);
    // 25 animation steps plus one hold frame per slide.
    assert_eq!(frames, 78);
    assert_eq!(v.exporter().status().status, ExportStatus::Done);

    let artifacts = sink.artifacts();
    assert_eq!(artifacts.len(), 1);
    let decoder = image::codecs::gif::GifDecoder::new(Cursor::new(&artifacts[0].bytes)).unwrap();
    let decoded = decoder.into_frames().collect_frames().unwrap();
    assert_eq!(decoded.len(), 78);
    let total_ms: u32 = decoded
        .iter()
        .map(|f| {
            let (n, d) = f.delay().numer_denom_ms();
            n / d
        })
        .sum();
    assert_eq!(total_ms, 15_000);
    assert_eq!(decoded[0].buffer().dimensions(), (32, 18));
}

#[tokio::test(start_paused = true)]
async fn frame_addressable_export_sums_to_slide_durations() {
    let v = view(three_images(), SlideshowConfig::new("Calm Day", Theme::Calm));
    let frames = MemoryFrames::new();
    let sink = MemorySink::new();

    v.export(
        Encoder::FrameAddressable(Box::new(frames.clone())),
        &sink,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(frames.is_finished());
    assert_eq!(frames.total_duration(), Duration::from_millis(15_000));
    let recorded = frames.frames();
    let per_slide = recorded.len() / 3;
    // Each slide closes on its hold frame, which repeats the settled last step.
    for slide in 0..3 {
        let hold = &recorded[slide * per_slide + per_slide - 1];
        let last_step = &recorded[slide * per_slide + per_slide - 2];
        assert_eq!(hold.frame, last_step.frame);
        assert!(hold.duration >= Duration::from_millis(3_000));
    }
    assert_eq!(sink.artifacts()[0].filename, "calm_day.rgba");
}

#[tokio::test(start_paused = true)]
async fn stream_capture_samples_at_the_export_rate() {
    let v = view(three_images(), summer_trip());
    let capture = MemoryCapture::new();
    let sink = MemorySink::new();

    let start = tokio::time::Instant::now();
    let outcome = v
        .export(
            Encoder::StreamCaptured(Box::new(capture.clone())),
            &sink,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(matches!(outcome, ExportOutcome::Completed { duration_ms: 15_000, .. }));
    assert!(elapsed >= Duration::from_millis(15_000), "{elapsed:?}");
    assert_eq!(capture.stopped_at(), Some(Duration::from_millis(15_000)));
    assert_eq!(capture.sampled_frames(), 450);
    let presentations = capture.presentations();
    assert_eq!(presentations.len(), 75);
    assert_eq!(presentations[25].at, Duration::from_millis(5_000));
}

#[tokio::test(start_paused = true)]
async fn localized_title_names_the_file_in_the_display_language() {
    let config = SlideshowConfig {
        title: serde_json::from_value(json!({"en": "Summer Trip", "zh": "夏日 之旅"})).unwrap(),
        theme: Theme::Professional,
    };
    let mut v = view(three_images(), config);
    v.toggle_language();
    assert_eq!(v.language(), Language::Zh);

    let sink = MemorySink::new();
    v.export(Encoder::gif(), &sink, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(sink.artifacts()[0].filename, "夏日_之旅.gif");
}

#[tokio::test(start_paused = true)]
async fn second_export_while_busy_is_ignored() {
    let v = view(three_images(), summer_trip());
    let exporter = v.exporter();
    let sink = MemorySink::new();

    let (first, second) = tokio::join!(
        exporter.export(
            v.export_request(),
            Encoder::StreamCaptured(Box::new(MemoryCapture::new())),
            &sink,
            CancellationToken::new(),
        ),
        exporter.export(
            v.export_request(),
            Encoder::gif(),
            &sink,
            CancellationToken::new(),
        ),
    );
    assert!(matches!(first.unwrap(), ExportOutcome::Completed { .. }));
    assert_eq!(second.unwrap(), ExportOutcome::Ignored);
    assert_eq!(sink.artifacts().len(), 1);
    assert!(!exporter.is_busy());
}

#[tokio::test(start_paused = true)]
async fn cancelled_export_resets_and_releases_the_surface() {
    let mut v = view(three_images(), summer_trip());
    let sink = MemorySink::new();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(6_000)).await;
        trigger.cancel();
    });
    let outcome = v
        .export(
            Encoder::StreamCaptured(Box::new(MemoryCapture::new())),
            &sink,
            cancel,
        )
        .await
        .unwrap();

    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert!(sink.artifacts().is_empty());
    let session = v.exporter().status();
    assert_eq!(session.status, ExportStatus::Idle);
    assert_eq!(session.accumulated_chunks, 0);
    assert!(!v.exporter().is_busy());
    assert!(v.render_preview().unwrap().is_some());

    // The export interrupted the pending transition; a full period follows the release.
    let start = tokio::time::Instant::now();
    assert_eq!(v.advance().await, 1);
    assert_eq!(start.elapsed(), Duration::from_millis(5_000));
}

#[tokio::test(start_paused = true)]
async fn undecodable_image_fails_the_export() {
    let images = vec![
        png([1, 2, 3, 255]),
        ImageInput::new("image/png", b"definitely not a png".to_vec()),
    ];
    let v = view(images, summer_trip());
    let sink = MemorySink::new();

    let err = v
        .export(Encoder::gif(), &sink, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SlidecastError::ImageDecode(_)), "{err}");
    assert!(err.to_string().contains("image 1"), "{err}");
    assert_eq!(v.exporter().status().status, ExportStatus::Idle);
    assert!(!v.exporter().is_busy());
    assert!(sink.artifacts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn export_request_with_one_image_is_rejected() {
    let v = view(three_images(), summer_trip());
    let request = ExportRequest {
        images: vec![png([9, 9, 9, 255])],
        config: summer_trip(),
        language: Language::En,
    };
    let err = v
        .exporter()
        .export(request, Encoder::gif(), &MemorySink::new(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SlidecastError::InputValidation(_)));
    assert_eq!(v.exporter().status().status, ExportStatus::Idle);
}
