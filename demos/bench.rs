use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::Instant;

use clap::{Arg, ArgAction, Command};
use tracing_subscriber::EnvFilter;
use weighted_hash_ring::{DigestKind, Node, Ring};

fn parse_node(s: &str) -> Result<Node, String> {
    match s.split_once(':') {
        None => Ok(Node::new(s)),
        Some((id, weight)) => weight
            .parse()
            .map(|w| Node::new(id).weight(w))
            .map_err(|e| format!("bad weight in {:?}: {}", s, e)),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = Command::new("bench")
        .arg(
            Arg::new("WORD_FILE")
                .index(1)
                .help("One key per line; numbered keys are generated when omitted"),
        )
        .arg(
            Arg::new("NODES")
                .long("nodes")
                .required(true)
                .num_args(1..)
                .action(ArgAction::Append)
                .value_parser(parse_node)
                .help("Nodes as ID or ID:WEIGHT"),
        )
        .arg(
            Arg::new("DIGEST")
                .long("digest")
                .default_value("md5")
                .value_parser(|s: &str| s.parse::<DigestKind>().map_err(|e| e.to_string())),
        )
        .arg(
            Arg::new("KEY_COUNT")
                .long("keys")
                .default_value("100000")
                .value_parser(clap::value_parser!(usize)),
        )
        .get_matches();

    let words: Vec<String> = match matches.get_one::<String>("WORD_FILE") {
        Some(path) => BufReader::new(File::open(path)?)
            .lines()
            .collect::<Result<_, _>>()?,
        None => {
            let count = matches.get_one::<usize>("KEY_COUNT").copied().unwrap_or(0);
            (0..count).map(|i| format!("key:{}", i)).collect()
        }
    };
    println!("WORD COUNT: {}", words.len());

    let digest = matches
        .get_one::<DigestKind>("DIGEST")
        .copied()
        .unwrap_or_default();
    let nodes: Vec<Node> = matches
        .get_many::<Node>("NODES")
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    let ring = Ring::new(nodes, digest)?;
    println!("DIGEST: {}", digest);
    println!("REAL NODE COUNT: {}", ring.node_count());
    println!("VIRTUAL POINT COUNT: {}", ring.len());

    let start_time = Instant::now();
    for word in words.iter() {
        ring.get_node(word)?;
    }
    let elapsed = start_time.elapsed();

    let mut counts: HashMap<&str, usize> =
        ring.nodes().iter().map(|n| (n.id.as_str(), 0)).collect();
    for word in words.iter() {
        *counts.entry(ring.get_node(word)?).or_default() += 1;
    }

    println!();
    println!("SELECTED COUNT PER NODE:");
    for node in ring.nodes() {
        let count = counts.get(node.id.as_str()).copied().unwrap_or(0);
        let share = count as f64 * 100.0 / words.len().max(1) as f64;
        println!(
            "- {} (weight {}, {} replicas): \t{} ({:.2}%)",
            node.id,
            node.weight,
            ring.replicas(&node.id).unwrap_or(0),
            count,
            share
        );
    }
    println!();

    let micros = elapsed.as_micros().max(1);
    println!("ELAPSED: {} ms", micros / 1000);
    println!(
        "WORDS PER SECOND: {}",
        (words.len() as f64 / micros as f64 * 1_000_000.0) as u64
    );
    Ok(())
}
