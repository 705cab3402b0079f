use std::process::ExitCode;

use clap::Parser;
use devcal::cli::Cli;
use devcal::detect::ChessboardPatternDetector;
use devcal::{
    Collaborators, DefaultMedia, FilePreview, FleetOrchestrator, JsonResultWriter,
    PlanarIntrinsicsSolver,
};
use log::{error, info};

#[cfg(feature = "tracing")]
use devcal::init_tracing;
#[cfg(not(feature = "tracing"))]
use devcal::init_with_level;

fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(not(feature = "tracing"))]
    if let Err(e) = init_with_level(cli.log_level) {
        eprintln!("cannot install logger: {e}");
    }
    #[cfg(feature = "tracing")]
    init_tracing(cli.log_level, false);

    let cfg = match cli.resolve() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            eprintln!("devcal: {e}");
            return ExitCode::from(e.exit_code());
        }
    };
    info!(
        "pattern {}, square size {}, data root {}",
        cfg.pattern,
        cfg.square_size,
        cfg.data_dir.display()
    );

    let detector = ChessboardPatternDetector::default();
    let solver = PlanarIntrinsicsSolver {
        options: cfg.solver,
    };
    let media = DefaultMedia::new(cfg.ffmpeg.clone());
    let writer = JsonResultWriter::new(&cfg.output_dir);
    let mut preview = FilePreview::stdin(&cfg.preview_dir);
    let tools = Collaborators {
        detector: &detector,
        solver: &solver,
        media: &media,
        writer: &writer,
    };

    match FleetOrchestrator::new(&cfg, tools).run(&mut preview) {
        Ok(report) if report.status.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
