fn main() {
    if let Err(err) = cli::run() {
        eprintln!("threadforge error: {err}");
        std::process::exit(1);
    }
}

mod cli {
    use std::fs;
    use std::path::{Path, PathBuf};

    use threadforge::config::PartsConfig;
    use threadforge::mesh_io::{self, MeshFormat};
    use threadforge::parts::{NamedMesh, PartError, PartKind};
    use threadforge::relief::{self, StencilParams};
    use threadforge::text::TextRenderer;
    use threadforge::thread::{ThreadSpec, create_threaded_cylinder_with, flip_z};
    use wildmatch::WildMatch;

    const USAGE: &str = r#"threadforge

USAGE:
  threadforge list
  threadforge run <part|pattern|all> [options]
  threadforge thread [thread options] [options]
  threadforge relief [<image>] [relief options] [options]
  threadforge config

PARTS (wildcards allowed, e.g. `eye*`):
  snack_box, bolt, eye_piece, phone_mount, keychain, fabric

OPTIONS:
  --config <file>      JSON parameter file (see `threadforge config`)
  --out-dir <dir>      Output directory (default from config, else .)
  --format <fmt>       stl | stl_ascii | obj
  --samples <n>        Helix samples per turn for every thread
  --overwrite          Overwrite existing output files
  -v, --verbose        Debug logging (RUST_LOG takes precedence)
  -h, --help           Show this help

THREAD OPTIONS:
  --radius <r>  --height <h>  --thickness <t>  --pitch <p>
                       Override the config's `thread` section
  --flip               Mirror the result through z with flip_z
  --name <stem>        Output file stem (default threaded_cylinder)

RELIEF OPTIONS:
  <image>              Picture to extrude (default: the config's `relief.image`)
  --stencil            Trace edges into a stencil sheet
  --no-board           Leave out the backing board
  --name <stem>        Output file stem (default relief)
"#;

    struct Options {
        config: PartsConfig,
        out_dir: Option<PathBuf>,
        format: Option<MeshFormat>,
        overwrite: bool,
    }

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");
        init_logger(verbose);
        let mut args = Args::new(args.into_iter().filter(|a| a != "-v" && a != "--verbose").collect());

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "list" => {
                for kind in PartKind::ALL {
                    println!("{:<12} {}", kind.name(), kind.description());
                }
                Ok(())
            }
            "run" => cmd_run(&mut args),
            "thread" => cmd_thread(&mut args),
            "relief" => cmd_relief(&mut args),
            "config" => {
                let json = PartsConfig::default().to_json_pretty().map_err(|e| e.to_string())?;
                println!("{json}");
                Ok(())
            }
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn init_logger(verbose: bool) {
        let level = if verbose { "threadforge=debug" } else { "info" };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
            .target(env_logger::Target::Stdout)
            .init();
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    /// Parses the shared options; `extra` gets first look at each flag and
    /// returns false for flags it does not know.
    fn parse_options(
        args: &mut Args,
        mut extra: impl FnMut(&str, &mut Args) -> Result<bool, String>,
    ) -> Result<Options, String> {
        let mut config_path: Option<PathBuf> = None;
        let mut out_dir = None;
        let mut format = None;
        let mut samples: Option<usize> = None;
        let mut overwrite = false;

        while let Some(arg) = args.next() {
            if extra(arg.as_str(), args)? {
                continue;
            }
            match arg.as_str() {
                "--config" => config_path = Some(PathBuf::from(args.value("--config")?)),
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--format" => format = Some(parse_format(&args.value("--format")?)?),
                "--samples" => samples = Some(args.parse("--samples")?),
                "--overwrite" => overwrite = true,
                "-h" | "--help" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        let mut config = match config_path {
            Some(path) => PartsConfig::load(&path).map_err(|e| e.to_string())?,
            None => PartsConfig::default(),
        };
        if let Some(samples) = samples {
            config.set_samples_per_turn(samples);
        }
        Ok(Options {
            config,
            out_dir,
            format,
            overwrite,
        })
    }

    fn parse_format(value: &str) -> Result<MeshFormat, String> {
        match value {
            "stl" | "stl_binary" => Ok(MeshFormat::StlBinary),
            "stl_ascii" | "ascii" => Ok(MeshFormat::StlAscii),
            "obj" => Ok(MeshFormat::Obj),
            other => Err(format!("unknown format `{other}` (stl, stl_ascii, obj)")),
        }
    }

    fn select_parts(pattern: &str) -> Result<Vec<PartKind>, String> {
        if pattern == "all" {
            return Ok(PartKind::ALL.to_vec());
        }
        let wm = WildMatch::new(pattern);
        let selected: Vec<PartKind> = PartKind::ALL.into_iter().filter(|k| wm.matches(k.name())).collect();
        if selected.is_empty() {
            return Err(unknown_part(pattern));
        }
        Ok(selected)
    }

    fn unknown_part(name: &str) -> String {
        let mut msg = format!("no part matches `{name}`");
        let closest = PartKind::ALL
            .into_iter()
            .map(|k| (levenshtein::levenshtein(name, k.name()), k))
            .min_by_key(|(distance, _)| *distance);
        if let Some((distance, kind)) = closest {
            if distance <= 3 {
                msg.push_str(&format!(", did you mean `{kind}`?"));
            }
        }
        msg.push_str("\n\navailable parts:\n");
        for kind in PartKind::ALL {
            msg.push_str(&format!("  {}\n", kind.name()));
        }
        msg
    }

    fn cmd_run(args: &mut Args) -> Result<(), String> {
        let pattern = args.next().ok_or("missing part name")?;
        let kinds = select_parts(&pattern)?;
        let options = parse_options(args, |_, _| Ok(false))?;
        let out_dir = options.out_dir.clone().unwrap_or_else(|| options.config.output.dir.clone());
        fs::create_dir_all(&out_dir).map_err(|e| format!("create out dir: {e}"))?;

        for (kind, built) in build_all(&kinds, &options.config) {
            let meshes = built.map_err(|e| format!("{kind}: {e}"))?;
            for part in &meshes {
                write_mesh(&out_dir, part, &options)?;
            }
        }
        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn build_all(kinds: &[PartKind], config: &PartsConfig) -> Vec<(PartKind, Result<Vec<NamedMesh>, PartError>)> {
        use rayon::prelude::*;

        kinds
            .par_iter()
            .map(|&kind| (kind, kind.build(config, &config.text as &dyn TextRenderer)))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn build_all(kinds: &[PartKind], config: &PartsConfig) -> Vec<(PartKind, Result<Vec<NamedMesh>, PartError>)> {
        kinds
            .iter()
            .map(|&kind| (kind, kind.build(config, &config.text as &dyn TextRenderer)))
            .collect()
    }

    fn cmd_thread(args: &mut Args) -> Result<(), String> {
        let (mut radius, mut height, mut thickness, mut pitch): (Option<f64>, Option<f64>, Option<f64>, Option<f64>) =
            (None, None, None, None);
        let mut flip = false;
        let mut name = String::from("threaded_cylinder");
        let options = parse_options(args, |flag, args| {
            match flag {
                "--radius" => radius = Some(args.parse(flag)?),
                "--height" => height = Some(args.parse(flag)?),
                "--thickness" => thickness = Some(args.parse(flag)?),
                "--pitch" => pitch = Some(args.parse(flag)?),
                "--flip" => flip = true,
                "--name" => name = args.value(flag)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        // Flags win over the config's `thread` section.
        let mut spec: ThreadSpec = options.config.thread;
        spec.radius = radius.unwrap_or(spec.radius);
        spec.height = height.unwrap_or(spec.height);
        spec.thread_thickness = thickness.unwrap_or(spec.thread_thickness);
        spec.pitch = pitch.unwrap_or(spec.pitch);

        let threaded = create_threaded_cylinder_with(&spec).map_err(|e| e.to_string())?;
        let mesh = if flip { flip_z(&threaded.mesh) } else { threaded.mesh };
        let out_dir = options.out_dir.clone().unwrap_or_else(|| options.config.output.dir.clone());
        fs::create_dir_all(&out_dir).map_err(|e| format!("create out dir: {e}"))?;
        write_mesh(&out_dir, &NamedMesh::new(name, mesh), &options)
    }

    fn cmd_relief(args: &mut Args) -> Result<(), String> {
        let mut image: Option<PathBuf> = None;
        let mut stencil = false;
        let mut board = true;
        let mut name = String::from("relief");
        let options = parse_options(args, |flag, args| {
            match flag {
                "--stencil" => stencil = true,
                "--no-board" => board = false,
                "--name" => name = args.value(flag)?,
                path if !path.starts_with('-') && image.is_none() => image = Some(PathBuf::from(path)),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        let mut params = options.config.relief.clone();
        if stencil && params.stencil.is_none() {
            params.stencil = Some(StencilParams::default());
        }
        if !board {
            params.board_thickness = None;
        }

        let relief = relief::build(&params, image.as_deref()).map_err(|e| e.to_string())?;
        let out_dir = options.out_dir.clone().unwrap_or_else(|| options.config.output.dir.clone());
        fs::create_dir_all(&out_dir).map_err(|e| format!("create out dir: {e}"))?;
        write_mesh(&out_dir, &relief.into_named(&name), &options)
    }

    fn write_mesh(dir: &Path, part: &NamedMesh, options: &Options) -> Result<(), String> {
        let format = options.format.unwrap_or(options.config.output.format);
        let path = dir.join(format!("{}.{}", part.name, format.extension()));
        if path.exists() && !options.overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }
        mesh_io::save_mesh_as(&part.mesh, &path, format).map_err(|e| format!("write {}: {e}", path.display()))?;
        eprintln!(
            "{}: vertices={} triangles={} | {}",
            part.name,
            part.mesh.vertex_count(),
            part.mesh.triangle_count(),
            part.mesh.diagnostics().summary()
        );
        Ok(())
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next().ok_or_else(|| format!("missing value for {flag}"))
        }

        fn parse<T: std::str::FromStr>(&mut self, flag: &str) -> Result<T, String> {
            let raw = self.value(flag)?;
            raw.parse().map_err(|_| format!("invalid value `{raw}` for {flag}"))
        }
    }
}
