/// Single Image Detection
///
/// Loads both models, warms them up, runs one image through the pipeline and
/// prints the detections as JSON on stdout.
///
/// Usage:
///   cargo run --release --bin detect-image -- <image_path> [config.json] [annotated_output] [min_confidence]
use letterbox_detector::image_utils::draw_detections;
use letterbox_detector::pipeline;
use letterbox_detector::postprocessing::utils::{clip_to_frame, group_by_class};
use letterbox_detector::{ImageData, PipelineConfig};
use std::env;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let image_path = args
        .get(1)
        .ok_or("usage: detect-image <image_path> [config.json] [annotated_output] [min_confidence]")?;
    let min_confidence: f32 = match args.get(4) {
        Some(value) => value.parse()?,
        None => 0.0,
    };

    log::info!("letterbox-detector v{}", letterbox_detector::version());

    let config = match args.get(2) {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let input_size = config.input_size;

    let pipeline = pipeline::init_global(config);
    if !pipeline.is_ready() {
        log::warn!("Models failed to load; requests will be rejected");
    }

    let image = ImageData::from_file(image_path)?;
    let result = pipeline
        .detect_image(&image)
        .await?
        .filter_by_confidence(min_confidence)
        .sorted_by_confidence();
    log::info!(
        "{} detections in {:.1}ms",
        result.count(),
        result.inference_time_ms
    );

    for det in &result.detections {
        log::info!(
            "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
            det.class_name(),
            det.probability * 100.0,
            det.x(),
            det.y(),
            det.width(),
            det.height()
        );
    }

    let mut per_class: Vec<_> = group_by_class(&result.detections).into_iter().collect();
    per_class.sort_by_key(|(label, _)| *label);
    for (label, detections) in &per_class {
        log::info!("  {} x{}", letterbox_detector::types::class_name(*label), detections.len());
    }

    println!("{}", serde_json::to_string_pretty(&result.detections)?);

    if let Some(output_path) = args.get(3) {
        let mut annotated = image::open(image_path)?.to_rgb8();
        let boxes = clip_to_frame(
            result.to_image_pixels(input_size),
            annotated.width() as f32,
            annotated.height() as f32,
        );
        draw_detections(&mut annotated, &boxes, 2);
        annotated.save(output_path)?;
        log::info!("Annotated image written to {}", output_path);
    }

    Ok(())
}
