use scout_runtime::ScoutRuntime;

pub(super) async fn cmd_research(config: scout_config::ScoutConfig) -> scout_core::Result<()> {
    println!("🔭 Running research cycle with {}...", config.research_model());

    let runtime = ScoutRuntime::from_config(config)?;
    let report = runtime.run_research_once().await?;

    let failures = report.payload.failures();
    println!();
    println!("{}", report.memo);
    println!();
    println!("📝 Memo:    {}", report.memo_path.display());
    println!("📦 Payload: {}", report.payload_path.display());
    if failures > 0 {
        println!(
            "⚠️  {failures} of {} provider queries were unavailable",
            report.payload.queries()
        );
    }
    Ok(())
}
