//! The `vignette load` command: drive one request through the pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use vignette_core::{Config, Grayscale, ImagePipeline, ImageSource, LoadRequest, Transformation};

/// Arguments for the `load` command.
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Image source: a local path or an http(s) URL
    #[arg(required = true)]
    pub source: String,

    /// Output file for the decoded image (first frame for animations)
    #[arg(short, long, default_value = "out.png")]
    pub output: PathBuf,

    /// Maximum output width in pixels (0 = unconstrained)
    #[arg(long, default_value = "0")]
    pub max_width: u32,

    /// Maximum output height in pixels (0 = unconstrained)
    #[arg(long, default_value = "0")]
    pub max_height: u32,

    /// Allow enlarging beyond native resolution
    #[arg(long)]
    pub upscale: bool,

    /// Convert the image to grayscale
    #[arg(long)]
    pub grayscale: bool,

    /// Abort the load after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

fn parse_source(raw: &str) -> ImageSource {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        ImageSource::url(raw)
    } else {
        ImageSource::file(raw)
    }
}

/// Execute the load command.
pub async fn execute(args: LoadArgs, config: Config) -> anyhow::Result<()> {
    let pipeline = ImagePipeline::new(config);

    let mut request = LoadRequest::new(parse_source(&args.source))
        .downsample(args.max_width, args.max_height);
    if args.upscale {
        request = request.allow_upscale(true);
    }
    if args.grayscale {
        request = request.transform(Arc::new(Grayscale) as Arc<dyn Transformation>);
    }

    // The core has no intrinsic timeouts; the CLI imposes one by
    // cancelling the request's token.
    let token = CancellationToken::new();
    request = request.cancellation(token.clone());
    if let Some(secs) = args.timeout_secs {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            token.cancel();
        });
    }

    let start = std::time::Instant::now();
    let image = pipeline.load(request).await?;
    let elapsed = start.elapsed();

    let (width, height) = image.dimensions();
    let (native_w, native_h) = image.original_dimensions();
    tracing::info!(
        "Loaded {} ({}x{}, native {}x{}, {} frame(s), {:?})",
        args.source,
        width,
        height,
        native_w,
        native_h,
        image.frame_count(),
        elapsed
    );

    if image.is_animated() {
        tracing::warn!(
            "Animated image: writing only the first of {} frames",
            image.frame_count()
        );
    }
    image.primary().image.save(&args.output)?;
    println!("{}", args.output.display());

    Ok(())
}
