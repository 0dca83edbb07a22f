use game_engine_js::config::init_logging;
use game_engine_js::host::demo_class_db;
use game_engine_js::{JsLanguage, LanguageConfig};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

const WATCH_INTERVAL: Duration = Duration::from_millis(200);

const USAGE: &str = "usage: game_engine_js [config.toml] <script.js>";

fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let (config_path, script_path) = match args {
        [script] => (None, script),
        [config, script] => (Some(config), script),
        _ => return Err(USAGE.into()),
    };

    let mut config = match config_path {
        Some(path) => LanguageConfig::from_toml_file(path)?,
        None => LanguageConfig::load_or_default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    init_logging(&config.logging);

    let source = std::fs::read_to_string(script_path)?;
    let mut language = JsLanguage::new(Rc::new(demo_class_db()), config);
    language.init()?;

    let path = Path::new(script_path);
    let result = language.execute_source(&path.display().to_string(), &source)?;
    if !result.is_nil() {
        println!("{}", result);
    }

    // 配置了监视目录时常驻，脚本保存后重新求值
    if let Some(watcher) = language.watch_scripts()? {
        loop {
            std::thread::sleep(WATCH_INTERVAL);
            match language.rerun_if_changed(&watcher, path) {
                Ok(Some(result)) if !result.is_nil() => println!("{}", result),
                Ok(_) => {}
                Err(err) => tracing::error!(target: "script", error = %err, "Re-run failed"),
            }
            language.collect_garbage()?;
        }
    }

    language.collect_garbage()?;
    language.finish();
    tracing::info!(target: "script", "Script finished");
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("Script failed: {}", e);
        std::process::exit(1);
    }
}
