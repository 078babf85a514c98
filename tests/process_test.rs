/*!
 * Process Tests
 * Connections and shared arenas across fork(2)
 */

use conduit::{make_pipe, wait, IpcError, SharedArena};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Run `child` in a forked process and return its exit status
///
/// The closure's return value becomes the exit code; a panic exits with 101.
fn run_in_child<F: FnOnce() -> i32>(child: F) -> WaitStatus {
    match unsafe { fork() }.unwrap() {
        ForkResult::Child => {
            let code = catch_unwind(AssertUnwindSafe(child)).unwrap_or(101);
            unsafe { nix::libc::_exit(code) }
        }
        ForkResult::Parent { child } => waitpid(child, None).unwrap(),
    }
}

fn assert_exited_cleanly(status: WaitStatus) {
    assert!(
        matches!(status, WaitStatus::Exited(_, 0)),
        "child ended with {:?}",
        status
    );
}

#[test]
#[serial]
fn test_send_to_closed_peer_fails_under_default_sigpipe() {
    let status = run_in_child(|| {
        unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) }.unwrap();

        let (a, b) = make_pipe(true).unwrap();
        drop(b);
        if !matches!(a.send_bytes(b"x"), Err(IpcError::BrokenPipe)) {
            return 1;
        }

        let (rx, tx) = make_pipe(false).unwrap();
        drop(rx);
        if !matches!(tx.send_bytes(b"x"), Err(IpcError::BrokenPipe)) {
            return 2;
        }
        0
    });
    assert_exited_cleanly(status);
}

#[test]
#[serial]
fn test_child_process_shares_arena_and_pipe() {
    let arena = SharedArena::new(256).unwrap();
    let mut counts = arena.array([0i32; 4]).unwrap();
    let (parent_end, child_end) = make_pipe(true).unwrap();

    let status = run_in_child(|| {
        counts.set(1, 777).unwrap();
        child_end.send_bytes(b"written").unwrap();
        0
    });
    assert_exited_cleanly(status);

    let ready = wait(&[&parent_end], Some(Duration::from_secs(5))).unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(&parent_end.recv_bytes().unwrap()[..], b"written");
    assert_eq!(counts.get(1).unwrap(), 777);
    assert_eq!(counts.to_vec(), vec![0, 777, 0, 0]);
}

#[test]
#[serial]
fn test_private_arena_stays_in_process() {
    let arena = SharedArena::private(64).unwrap();
    let mut value = arena.value(5i64).unwrap();

    let status = run_in_child(|| {
        value.set(99);
        0
    });
    assert_exited_cleanly(status);
    assert_eq!(value.get(), 5);
}

#[test]
#[serial]
fn test_child_exit_surfaces_as_eof() {
    let (parent_end, child_end) = make_pipe(true).unwrap();

    let status = run_in_child(|| {
        child_end.send_bytes(b"bye").unwrap();
        0
    });
    assert_exited_cleanly(status);
    drop(child_end);

    assert_eq!(&parent_end.recv_bytes().unwrap()[..], b"bye");
    assert!(parent_end.poll(Some(Duration::from_secs(5))).unwrap());
    assert!(matches!(parent_end.recv_bytes(), Err(IpcError::Eof)));
}
