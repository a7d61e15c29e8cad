use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use correl_core::mesh::{
    global_correlation, label_tetrahedra, BoundaryCondition, GlobalCorrelationConfig,
    GlobalCorrelationResult, Mesh,
};
use serde::Deserialize;

use crate::input::{load_config, load_volume, parse_triple};

#[derive(Args)]
pub struct GlobalArgs {
    /// Reference volume (.raw)
    pub reference: PathBuf,

    /// Deformed volume (.raw), same shape as the reference
    pub moving: PathBuf,

    /// Shape z,y,x of the volumes
    #[arg(long)]
    pub shape: String,

    /// Mesh origin z,y,x in voxels
    #[arg(long, default_value = "0,0,0")]
    pub origin: String,

    /// Mesh cell size z,y,x in voxels
    #[arg(long)]
    pub spacing: String,

    /// Number of mesh cells z,y,x
    #[arg(long)]
    pub cells: String,

    /// Global correlation config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Boundary conditions file (TOML, [[bc]] tables with node, axis, displacement)
    #[arg(long)]
    pub boundary: Option<PathBuf>,

    /// Override the maximum number of iterations
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Write nodal displacements as text, one node per line
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Deserialize)]
struct BoundaryFile {
    #[serde(default)]
    bc: Vec<BoundaryCondition>,
}

pub fn run(args: &GlobalArgs) -> Result<()> {
    let mut config: GlobalCorrelationConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => GlobalCorrelationConfig::default(),
    };
    if let Some(n) = args.max_iterations {
        config.max_iterations = n;
    }
    let boundary = match &args.boundary {
        Some(path) => load_config::<BoundaryFile>(path)?.bc,
        None => Vec::new(),
    };

    let shape: [usize; 3] = parse_triple(&args.shape, "shape")?;
    let reference = load_volume(&args.reference, Some(&args.shape))?;
    let moving = load_volume(&args.moving, Some(&args.shape))?;

    let mesh = Mesh::regular_grid(
        parse_triple(&args.origin, "origin")?,
        parse_triple(&args.spacing, "spacing")?,
        parse_triple(&args.cells, "cells")?,
    )
    .context("Invalid mesh grid")?;
    let labels = label_tetrahedra(&mesh, shape);
    println!(
        "Mesh: {} nodes, {} tetrahedra, {} boundary conditions",
        mesh.node_count(),
        mesh.cell_count(),
        boundary.len()
    );

    let pb = super::spinner("Correlating")?;
    let result = global_correlation(&reference, &moving, &mesh, &labels, None, &boundary, &config);
    pb.finish_and_clear();
    let result = result.context("Global correlation failed")?;

    crate::summary::print_global_summary(&result);
    if let Some(path) = &args.output {
        write_displacements(&mesh, &result, path)?;
        println!("Displacements saved to {}", path.display());
    }
    Ok(())
}

fn write_displacements(mesh: &Mesh, result: &GlobalCorrelationResult, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "# node z y x uz uy ux")?;
    for (node, (p, u)) in mesh.points.iter().zip(result.displacements.rows()).enumerate() {
        writeln!(
            writer,
            "{} {} {} {} {:.6} {:.6} {:.6}",
            node, p[0], p[1], p[2], u[0], u[1], u[2]
        )?;
    }
    writer.flush()?;
    Ok(())
}
