//! Concurrent access tests for write_atomic locking
//!
//! Verifies that the lock-file guarded writer never lets two writers
//! interleave their content.

use std::sync::{Arc, Barrier};
use std::thread;

use graft_fs::io;
use tempfile::tempdir;

#[test]
fn concurrent_writes_no_corruption() {
    let dir = tempdir().unwrap();
    let path = Arc::new(dir.path().join("registry.json"));

    let num_threads = 8;
    let writes_per_thread = 10;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..writes_per_thread {
                    let content = format!("thread{thread_id}:write{i}\n");
                    io::write_text(&path, &content).expect("locked write should succeed");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread should not panic");
    }

    let content = std::fs::read_to_string(path.as_ref()).unwrap();
    assert!(content.starts_with("thread"), "unexpected content: {content}");
    assert_eq!(content.matches("thread").count(), 1, "writes interleaved: {content}");
}
