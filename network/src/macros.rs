/// Runs a command to completion, panicking only if it could not be spawned.
#[macro_export]
macro_rules! run_command {
    ($command:expr $(, $args:expr)*) => {
        std::process::Command::new($command).args([$($args),*]).output()
            .expect("failed to run command")
    };
}

/// Skips the calling test unless running as root, then moves the test
/// thread into a fresh network namespace.
#[macro_export]
macro_rules! test_setup {
    () => {
        if !nix::unistd::geteuid().is_root() {
            eprintln!("Test skipped, must be run as root");
            return;
        }
        nix::sched::unshare(nix::sched::CloneFlags::CLONE_NEWNET).unwrap();
    };
}
