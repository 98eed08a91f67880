use std::env;
use std::io::Write;
use std::process::Command;
use std::thread::sleep;
use std::time::Duration;

// Sleeps for the given (possibly fractional) seconds.  With --spawn, a
// nested copy of itself sleeps alongside and its pid is written to
// stdout first, so a harness can check that a group-wide stop reclaims
// the whole subtree.
fn main() {
    let mut args = env::args().skip(1);
    let mut next = args.next();
    let spawn = next.as_deref() == Some("--spawn");
    if spawn {
        next = args.next();
    }
    let secs = next
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(30.0);

    if spawn {
        let exe = env::current_exe().expect("current exe");
        let child = Command::new(exe)
            .arg(secs.to_string())
            .spawn()
            .expect("spawn nested sleeper");
        println!("{}", child.id());
        std::io::stdout().flush().expect("flush stdout");
    }
    sleep(Duration::from_secs_f64(secs));
}
