//! pcie-dma-emu: cycle-level emulator for a PCIe DMA bridge SoC
//!
//! Resolves the build configuration, constructs the SoC, and writes the
//! register-map artifacts host software compiles against.

use std::env;
use std::fs;
use std::path::Path;

use pcie_dma_emu::config::Config;
use pcie_dma_emu::soc::PcieDmaSoc;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    if args.iter().any(|a| a == "--sample-config") {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let mut out_dir = "build";
    let mut it = args[1..].iter();
    while let Some(arg) = it.next() {
        if arg == "--out-dir" || arg == "-o" {
            match it.next() {
                Some(dir) => out_dir = dir,
                None => anyhow::bail!("--out-dir requires a path"),
            }
        } else if !arg.starts_with('-') {
            out_dir = arg;
        }
    }

    let config = Config::get().resolve();
    let soc = PcieDmaSoc::new(config);

    println!("PCIe DMA bridge SoC");
    println!("  uart bridge:   {}", config.with_uart_bridge);
    println!("  dma buffering: {}", config.with_dma_buffering);
    println!("  dma loopback:  {}", config.with_dma_loopback);
    println!("  sys clock:     {} Hz", config.sys_clk_freq_hz);
    println!("  link width:    x{}", config.pcie_link_width);
    println!();

    let map = soc.csr_map();
    println!("Register map: {} registers, {} interrupt vectors",
        map.entries().len(),
        map.interrupts().len());
    for (name, vector) in map.interrupts() {
        println!("  irq {}: {}", vector, name);
    }

    let out = Path::new(out_dir);
    fs::create_dir_all(out)?;

    let csv_path = out.join("csr.csv");
    fs::write(&csv_path, map.emit_csv())?;
    println!();
    println!("Wrote {}", csv_path.display());

    let header_path = out.join("csr.h");
    fs::write(&header_path, map.emit_c_header())?;
    println!("Wrote {}", header_path.display());

    Ok(())
}

fn print_usage() {
    println!("Usage: pcie-dma-emu [--out-dir DIR]");
    println!();
    println!("Builds the SoC model from the resolved configuration and writes");
    println!("the register-map artifacts (csr.csv, csr.h) to DIR (default: build).");
    println!();
    println!("Options:");
    println!("  -o, --out-dir DIR   output directory for generated artifacts");
    println!("  --sample-config     print a sample configuration file");
    println!("  -h, --help          show this help");
}
