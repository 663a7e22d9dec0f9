use std::path::PathBuf;
use std::process::exit;

use scm86::error::CompileError;
use structopt::StructOpt;
use termcolor::{ColorChoice, StandardStream};

#[derive(StructOpt)]
#[structopt(name = "scm86", about = "Scheme to x86-64 native-assembly compiler")]
struct Opt {
    /// Scheme source file
    input: PathBuf,
    /// Output base; the generated assembly lands in <out>.asm
    out: PathBuf,
    /// Print the analyzed intermediate tree instead of compiling
    #[structopt(long)]
    dump_il: bool,
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    if opt.dump_il {
        let source = match std::fs::read_to_string(&opt.input) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("cannot read {}: {}", opt.input.display(), e);
                exit(1);
            }
        };
        match scm86::analyze_string(&source) {
            Ok(program) => {
                let mut out = StandardStream::stdout(ColorChoice::Auto);
                for expr in &program {
                    if expr.pretty_print(&mut out).is_err() {
                        exit(1);
                    }
                    println!();
                }
            }
            Err(e) => report(e),
        }
        return;
    }

    match scm86::compile_file(&opt.input, &opt.out) {
        Ok(path) => log::info!("wrote {}", path.display()),
        Err(e) => report(e),
    }
}

fn report(e: CompileError) -> ! {
    match e {
        CompileError::Syntax(form, what) => {
            eprintln!("syntax error: {}:", what);
            let mut err = StandardStream::stderr(ColorChoice::Auto);
            let _ = form.pretty_print(&mut err);
            eprintln!();
        }
        other => eprintln!("{}", other),
    }
    exit(1);
}
