// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Four commands are supported:
//   1. `download` — fetches SQuAD and a pretrained BERT
//   2. `train`    — fine-tunes and exports bert_qa_vCPU.mpk
//   3. `evaluate` — exact match / F1 on a dev file
//   4. `predict`  — answers one question against one context
//
// The backend is chosen here: Autodiff<Wgpu> on the GPU by
// default, Autodiff<NdArray> with --cpu. Evaluation and
// prediction always run on the host.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu};
use clap::Parser;
use commands::{Commands, DownloadArgs, EvaluateArgs, PredictArgs, TrainArgs};
use std::path::Path;

use crate::application::train_use_case::{TrainConfig, TrainOutcome};
use crate::domain::stage::Placement;

#[derive(Parser, Debug)]
#[command(
    name = "squad-reader",
    version = "0.1.0",
    about = "Fine-tune a BERT reader on SQuAD, export it for the CPU, and answer questions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Download(args) => run_download(args),
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Predict(args)  => run_predict(args),
        }
    }
}

fn run_download(args: DownloadArgs) -> Result<()> {
    use crate::infra::download::{download_pretrained, download_squad};

    let files = download_squad(Path::new(&args.squad_dir))?;
    println!("SQuAD files in '{}': {}", args.squad_dir, files.len());

    if let Some(model) = args.model {
        let dir = download_pretrained(&model, Path::new(&args.models_dir))?;
        println!("Pretrained model in '{}'", dir.display());
    }
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let base = match &args.config {
        Some(path) => TrainConfig::load(Path::new(path))?,
        None       => TrainConfig::default(),
    };
    let cpu = args.cpu;
    let cfg = args.apply(base);
    tracing::info!("Fine-tuning '{}' on '{}'", cfg.model_dir, cfg.train_file);

    let use_case = TrainUseCase::new(cfg);
    let TrainOutcome { summary, artifact } = if cpu {
        use_case.execute::<Autodiff<NdArray>>(&NdArrayDevice::Cpu, Placement::Host)?
    } else {
        use_case.execute::<Autodiff<Wgpu>>(&WgpuDevice::default(), Placement::Accelerator)?
    };

    println!(
        "Training complete: {} steps, average loss {:.4}. Reader saved to '{}'.",
        summary.global_step, summary.average_loss, artifact.display()
    );
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let use_case = EvaluateUseCase::new(&args.output_dir, args.inference.into(), args.eval_all_checkpoints);
    for r in use_case.execute(Path::new(&args.dev_file))? {
        let s = &r.scores;
        println!(
            "[{}] exact = {:.2}  f1 = {:.2}  total = {}",
            r.label, s.overall.exact, s.overall.f1, s.overall.total
        );
        // Splits only mean something once unanswerable questions exist
        if s.no_ans.is_some() {
            for (name, split) in [("HasAns", &s.has_ans), ("NoAns", &s.no_ans)] {
                if let Some(split) = split {
                    println!("    {name:<6} exact = {:.2}  f1 = {:.2}  total = {}", split.exact, split.f1, split.total);
                }
            }
        }
        if let Some(best) = &s.best {
            println!(
                "    best   exact = {:.2} (thresh {:.3})  f1 = {:.2} (thresh {:.3})",
                best.best_exact, best.best_exact_thresh, best.best_f1, best.best_f1_thresh
            );
        }
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case   = PredictUseCase::new(Path::new(&args.artifact), args.inference.into())?;
    let prediction = use_case.answer(&args.question, &args.context)?;

    if prediction.is_empty() {
        println!("\nAnswer: (no answer)");
    } else {
        println!("\nAnswer: {}", prediction.text);
    }
    for (rank, span) in prediction.n_best.iter().take(5).enumerate() {
        println!("  {}. {:<30} p = {:.3}", rank + 1, span.text, span.probability);
    }
    Ok(())
}
