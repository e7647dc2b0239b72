//! Goroutine profile of a fan-in program
//!
//! Two "boring" producers feed one channel; after ten messages the program
//! starts the capture loop and lingers for five seconds.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example goroutine-profile
//! # within five seconds, in the same terminal:
//! # press CTRL+\ to capture and open the profile
//! ```

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};

fn boring(msg: &'static str) -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::Builder::new()
        .name(format!("boring-{msg}"))
        .spawn(move || {
            for i in 0u64.. {
                if tx.send(format!("{msg} {i}")).is_err() {
                    return;
                }
                // Pseudo-random pause below one second
                let pause = (i.wrapping_mul(7919) + msg.len() as u64 * 131) % 1000;
                std::thread::sleep(Duration::from_millis(pause));
            }
        })
        .expect("spawn producer");
    rx
}

fn fan_in(input1: Receiver<String>, input2: Receiver<String>) -> Receiver<String> {
    let (tx, rx) = unbounded();
    for (n, input) in [input1, input2].into_iter().enumerate() {
        let tx = tx.clone();
        std::thread::Builder::new()
            .name(format!("fan-in-{n}"))
            .spawn(move || {
                for message in input {
                    if tx.send(message).is_err() {
                        return;
                    }
                }
            })
            .expect("spawn fan-in");
    }
    rx
}

fn main() {
    env_logger::init();

    let c = fan_in(boring("Joe"), boring("Ann"));
    for message in c.iter().take(10) {
        println!("{message}");
    }
    println!("You're boring: I'm leaving");

    autoprof::capture(autoprof::Profile::Goroutine);

    std::thread::sleep(Duration::from_secs(5));
}
