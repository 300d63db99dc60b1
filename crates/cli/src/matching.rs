//! `block` and `match` subcommands: run the engine over a JSON record file.

use std::process;
use std::sync::Arc;

use recordlink_eval::{
    DiagnosticSession, InMemoryConfigurationProvider, InMemoryStore, MatchResult, Matcher,
    MatcherSettings,
};
use recordlink_storage::{DynamicRecord, FieldAccessor};
use tracing::debug;

use crate::{read_json, report_error, MatchArgs, OutputFormat};

struct Loaded {
    matcher: Matcher<DynamicRecord>,
    name: String,
    input: DynamicRecord,
}

fn fail(msg: &str, output: OutputFormat, quiet: bool) -> ! {
    report_error(msg, output, quiet);
    process::exit(1);
}

fn load(args: &MatchArgs, settings: MatcherSettings, output: OutputFormat, quiet: bool) -> Loaded {
    let config = read_json(&args.config, "configuration", output, quiet);
    let mut provider = InMemoryConfigurationProvider::new();
    let id = match provider.load_json(&config) {
        Ok(id) => id,
        Err(e) => fail(&format!("invalid configuration: {}", e), output, quiet),
    };

    let records = read_json(&args.records, "records", output, quiet);
    let records = match DynamicRecord::list_from_json(&records) {
        Ok(r) => r,
        Err(e) => fail(
            &format!("invalid records in '{}': {}", args.records.display(), e),
            output,
            quiet,
        ),
    };

    let input = read_json(&args.input, "input record", output, quiet);
    let input = match DynamicRecord::from_json(&input) {
        Ok(r) => r,
        Err(e) => fail(
            &format!("invalid input record in '{}': {}", args.input.display(), e),
            output,
            quiet,
        ),
    };

    debug!(
        configuration = %id,
        records = records.len(),
        input = %input.key,
        "loaded matching inputs"
    );

    let accessor = Arc::new(FieldAccessor);
    let store = InMemoryStore::new(records, accessor.clone()).with_approx(settings.approx.clone());
    let matcher = Matcher::new(Arc::new(provider), Arc::new(store), accessor).with_settings(settings);

    Loaded {
        matcher,
        name: args.name.clone().unwrap_or(id),
        input,
    }
}

fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fail(&format!("failed to create tokio runtime: {}", e), output, quiet),
    }
}

fn finish_session(
    session: Option<DiagnosticSession>,
    output: OutputFormat,
    quiet: bool,
) -> Option<serde_json::Value> {
    let session = session?;
    match session.session_data() {
        Ok(data) => serde_json::to_value(data).ok(),
        Err(e) => fail(&format!("{}", e), output, quiet),
    }
}

pub(crate) fn cmd_block(args: &MatchArgs, settings: MatcherSettings, output: OutputFormat, quiet: bool) {
    let loaded = load(args, settings, output, quiet);
    let mut session = args.diagnostics.then(DiagnosticSession::new);

    let rt = runtime(output, quiet);
    let result = rt.block_on(loaded.matcher.block(
        &loaded.input,
        &loaded.name,
        &args.ignore,
        session.as_mut(),
    ));
    let candidates = match result {
        Ok(c) => c,
        Err(e) => fail(&format!("{}", e), output, quiet),
    };
    let diagnostics = finish_session(session, output, quiet);

    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            println!("{} candidate(s) for '{}'", candidates.len(), loaded.input.key);
            for c in &candidates {
                println!("  {}", c.key);
            }
            if let Some(d) = &diagnostics {
                print_stages(d);
            }
        }
        OutputFormat::Json => {
            let mut json = serde_json::json!({
                "configuration": loaded.name,
                "inputKey": loaded.input.key,
                "candidates": candidates.iter().map(DynamicRecord::to_json).collect::<Vec<_>>(),
            });
            if let Some(d) = diagnostics {
                json["diagnostics"] = d;
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_default()
            );
        }
    }
}

pub(crate) fn cmd_match(args: &MatchArgs, settings: MatcherSettings, output: OutputFormat, quiet: bool) {
    let loaded = load(args, settings, output, quiet);
    let mut session = args.diagnostics.then(DiagnosticSession::new);

    let rt = runtime(output, quiet);
    let result = rt.block_on(loaded.matcher.match_records(
        &loaded.input,
        &loaded.name,
        &args.ignore,
        session.as_mut(),
    ));
    let results = match result {
        Ok(r) => r,
        Err(e) => fail(&format!("{}", e), output, quiet),
    };

    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            print_results(&loaded.input, &results);
            if let Some(d) = finish_session(session, output, quiet) {
                print_stages(&d);
            }
        }
        OutputFormat::Json => {
            let report = loaded.matcher.create_match_report(
                &loaded.input.record_type,
                &loaded.input,
                &results,
                session.as_ref(),
            );
            match report {
                Ok(r) => println!(
                    "{}",
                    serde_json::to_string_pretty(&r.to_json()).unwrap_or_default()
                ),
                Err(e) => fail(&format!("{}", e), output, quiet),
            }
        }
    }
}

fn print_results(input: &DynamicRecord, results: &[MatchResult<DynamicRecord>]) {
    println!("{} result(s) for '{}'", results.len(), input.key);
    for r in results {
        println!(
            "  {:<12} {:<9} score={:.3} strength={:.3} ({:?})",
            r.record.key, r.classification, r.score, r.strength, r.method
        );
        for v in &r.vectors {
            let score = v
                .score
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "-".to_string());
            let status = match (v.evaluated, v.passed) {
                (false, _) => "null",
                (true, true) => "pass",
                (true, false) => "fail",
            };
            println!("      {:<16} {:<4} {}", v.attribute, status, score);
        }
    }
}

fn print_stages(diagnostics: &serde_json::Value) {
    let Some(stages) = diagnostics["stages"].as_array() else {
        return;
    };
    println!("diagnostics:");
    for stage in stages {
        let actions = stage["actions"].as_array().map_or(0, Vec::len);
        println!(
            "  stage {} ({} action(s))",
            stage["name"].as_str().unwrap_or("?"),
            actions
        );
    }
}

