//! Drive an extension environment until no extension asks for another pass.
//!
//! Run with: cargo run --example rerun_passes

use std::rc::Rc;

use lua_ext_env::prelude::*;

/// A styler which prints each imported stylesheet.
struct PrintStyler;

impl Styler for PrintStyler {
    fn import_stylesheet(&self, sheet: &str) -> anyhow::Result<()> {
        println!("  stylesheet imported: {}", sheet);
        Ok(())
    }
}

const EXTENSION: &str = r#"
stylesheet('article')
if em_iter < 2 then
    requires_reiter()
end
"#;

fn main() -> Result<()> {
    let styler = Rc::new(PrintStyler);
    let args = Rc::new(DocArgs::new());
    let names = Rc::new(NameRegistry::new());

    let params = ExtParams::new(
        EnvConfig::builder().sandbox(SandboxLevel::Strict).build(),
        styler,
        args,
        names,
    );
    let mut env = ExtensionEnv::new(&params)?;

    while env.requires_rerun() {
        let pass = env.begin_pass()?;
        println!("=== Pass {} ===", pass);
        env.exec(EXTENSION, "extension")?;
        println!("  rerun requested: {}", env.requires_rerun());
    }

    env.finalize_for_output()?;
    match env.exec("stylesheet('late')", "output") {
        Ok(()) => println!("unexpected: styler still attached"),
        Err(e) => println!("after output: {}", e),
    }

    env.destroy();
    Ok(())
}
