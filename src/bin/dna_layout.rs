use blend_dna::{
    layout::LayoutError, Catalog, Domain, Endianness, Error, PointerSize, Target,
};
use clap::Parser;
use log::{error, info};
use std::{fs, path::PathBuf, process};

/// Prints the byte layout of the built-in DNA structs.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// Pointer width of the target, 32 or 64
    #[clap(short, long, default_value = "64")]
    pointer_size: PointerSize,
    /// Lay out for a big-endian target
    #[clap(long)]
    big_endian: bool,
    /// Print layouts as JSON
    #[clap(long)]
    json: bool,
    /// Check the layout rules for both pointer widths, exit non-zero on violations
    #[clap(long)]
    check: bool,
    /// Only print the structs of one domain
    #[clap(short, long)]
    domain: Option<Domain>,
    /// Write the encoded SDNA block to this file
    #[clap(long, parse(from_os_str))]
    sdna: Option<PathBuf>,
    /// Structs to print, all of them if empty
    #[clap(name = "STRUCT")]
    structs: Vec<String>,
}

fn run(opts: &Opts) -> Result<bool, Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let endianness = if opts.big_endian {
        Endianness::Big
    } else {
        Endianness::Little
    };
    let target = Target::new(opts.pointer_size, endianness);

    let mut valid = true;
    if opts.check {
        match catalog.validate() {
            Ok(()) => println!(
                "{} structs follow the layout rules on 32-bit and 64-bit",
                catalog.schema().len()
            ),
            Err(Error::Layout(LayoutError::Violations(violations))) => {
                for violation in &violations {
                    println!("{}", violation);
                }
                valid = false;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let layouts = catalog.layouts(target)?;

    if let Some(path) = &opts.sdna {
        let bytes = catalog.schema().to_dna(&layouts)?.to_sdna(endianness)?;
        fs::write(path, &bytes)?;
        info!("wrote {} bytes of SDNA to {}", bytes.len(), path.display());
    }

    let mut names = opts.structs.clone();
    if let Some(unknown) = names.iter().find(|n| layouts.get(n).is_none()) {
        return Err(format!("unknown struct `{}`", unknown).into());
    }
    if let Some(domain) = opts.domain {
        names.extend(catalog.structs_in(domain).map(|def| def.name.clone()));
    } else if names.is_empty() && (opts.check || opts.sdna.is_some()) {
        return Ok(valid);
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&layouts.report(&names))?);
    } else {
        for layout in layouts.report(&names).structs {
            println!("{}\n", layout);
        }
    }
    Ok(valid)
}

fn main() {
    env_logger::init();
    let opts = Opts::parse();
    match run(&opts) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            process::exit(2);
        }
    }
}
