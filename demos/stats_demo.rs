use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use robin_map::HashTable;
use robin_map::hash_table::Entry;
use siphasher::sip::SipHasher;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Number of elements the table is sized for up front.
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Insert this many times the target count, forcing growth.
    #[arg(short = 'o', long = "overfill", default_value_t = 1)]
    overfill: usize,

    /// Remove every n-th key after filling, to exercise backward shifting.
    #[arg(short = 'r', long = "remove_every")]
    remove_every: Option<u64>,
}

fn hash_u64(value: u64) -> u64 {
    let mut hasher = SipHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let args = Args::parse();

    println!(
        "Creating HashTable for {} expected elements",
        args.target_capacity
    );

    let mut table: HashTable<u64, u64> = HashTable::with_capacity(args.target_capacity);
    println!("Initial capacity: {}", table.capacity());

    let num_values = (args.target_capacity * args.overfill.max(1)) as u64;
    for value in 0..num_values {
        match table.entry(hash_u64(value), |&k| k == value) {
            Entry::Vacant(entry) => {
                entry.insert(value, value * 2);
            }
            Entry::Occupied(_) => {
                panic!("Value already exists in table: {}", value);
            }
        }
    }

    if let Some(step) = args.remove_every.filter(|&step| step > 0) {
        let mut removed = 0;
        for value in (0..num_values).step_by(step as usize) {
            if table.remove(hash_u64(value), |&k| k == value).is_some() {
                removed += 1;
            }
        }
        println!("Removed {} values", removed);
    }

    println!("Table holds {} values", table.len());
    println!(
        "Final load factor: {:.2}% of {} slots",
        (table.len() as f64 / table.capacity() as f64) * 100.0,
        table.capacity()
    );

    table.probe_histogram().print();
    table.debug_stats().print();
}
