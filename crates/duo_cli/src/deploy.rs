//! Pre-deploy checks followed by stack synthesis.

use anyhow::{Context, Result};
use tracing::{debug, info};

use duo_iac::{
    assets, preflight, CloudAssembly, ContextCache, EnvFile, ImageAsset, PreflightReport,
    PreflightValidator, ProvisionedStack, Settings, StackProfile, TemplateSynthesizer,
    TopologyProvisioner, CLUSTER_NAME_OUTPUT, LOAD_BALANCER_URL_OUTPUT,
};

use crate::cli::Cli;

/// Result of one invocation.
#[derive(Debug)]
pub enum Outcome {
    /// Checks failed; nothing was synthesized.
    Aborted(PreflightReport),
    /// Checks passed and the assembly was written.
    Synthesized {
        report: PreflightReport,
        stack: ProvisionedStack,
        assembly: CloudAssembly,
    },
}

/// Run the checks and, if they pass, synthesize the stack.
///
/// `settings` is the process environment snapshot; the env file only fills
/// names it does not already contain.
pub fn execute(cli: &Cli, mut settings: Settings) -> Result<Outcome> {
    if let Some(env_file) = EnvFile::load(&cli.env_file)? {
        let applied = env_file.apply_to(&mut settings);
        debug!("Applied {} values from {:?}", applied, env_file.path);
    }
    let settings = settings.with_region(cli.region.clone());

    println!("🔍 Running pre-deploy safety checks...");
    let app_dir = cli.app_dir();
    let report = PreflightValidator::new(&app_dir).validate(&settings);
    print_report(&report);

    if !report.passed {
        println!("🛑 Safety check failed. Please fix the above issues before deploying.");
        return Ok(Outcome::Aborted(report));
    }
    println!("✅ All pre-deploy checks passed. Proceeding with deployment.");

    let profile = StackProfile::default()
        .with_account(settings.account().map(String::from))
        .with_region(settings.region());

    let context = ContextCache::load(&cli.context_file)
        .with_context(|| format!("Failed to load context cache {:?}", cli.context_file))?;
    let mut synth = TemplateSynthesizer::new(profile.clone()).with_context(context);

    let fingerprint = assets::fingerprint(&app_dir).context("Failed to fingerprint app directory")?;
    let stack = TopologyProvisioner::new(profile, &app_dir)
        .with_image(ImageAsset::new(&app_dir).with_fingerprint(fingerprint))
        .provision(&settings, &mut synth)
        .context("Infrastructure synthesis failed")?;

    let assembly = CloudAssembly::write(&cli.out_dir, &synth, cli.format)
        .context("Failed to write cloud assembly")?;
    info!("Stack synthesized to {:?}", assembly.directory);

    print_outputs(&stack);
    println!("📦 Cloud assembly: {}", assembly.directory.display());

    Ok(Outcome::Synthesized {
        report,
        stack,
        assembly,
    })
}

fn print_report(report: &PreflightReport) {
    for check in &report.checks {
        if check.passed {
            println!("✅ {}", check.message);
        } else if check.name == preflight::DEFAULT_DESCRIPTOR {
            println!("❌ {}", check.message);
        } else {
            println!("⚠️  {}", check.message);
        }
    }
}

fn print_outputs(stack: &ProvisionedStack) {
    println!();
    println!("Outputs:");
    for name in [CLUSTER_NAME_OUTPUT, LOAD_BALANCER_URL_OUTPUT] {
        if let Some(output) = stack.output(name) {
            let value = serde_json::to_string(&output.value.to_json()).unwrap_or_default();
            match &output.description {
                Some(description) => println!("   {} = {}  ({})", name, value, description),
                None => println!("   {} = {}", name, value),
            }
        }
    }
}
