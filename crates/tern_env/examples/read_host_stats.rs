use tern_env::{exe_path, loadavg, uptime, MemoryStats};

fn main() {
    let start = std::time::Instant::now();
    let memory = MemoryStats::sample();
    let [one, five, fifteen] = loadavg();
    let elapsed = start.elapsed().as_micros() as u64;
    println!("Host statistics:");
    println!("  Free memory: {} bytes", memory.free);
    println!("  Total memory: {} bytes", memory.total);
    println!("  Load average: {:.2} {:.2} {:.2}", one, five, fifteen);
    println!("  Uptime: {:.0} seconds", uptime());
    match exe_path() {
        Ok(path) => println!("  Executable: {}", path),
        Err(e) => println!("  Executable: <{}>", e),
    }
    println!("Collected in {} microseconds", elapsed);

    let start = std::time::Instant::now();
    let _total = tern_env::total_memory();
    println!("Second total_memory() call took {} microseconds (cached)", start.elapsed().as_micros());
}
