pub mod api;
pub mod error;
pub mod model;
pub mod operations;
pub mod rpc;

pub use api::{ClientApi, FileUpdate, ProjectUpdate};
pub use error::ClientError;
pub use model::{FileRecord, Project};
pub use operations::Operations;
pub use rpc::{PooledRpcClient, RpcClient};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    use dbrelay_driver_sqlite::SqliteDriver;

    use super::*;

    /// Spins up a real accept loop + worker pool on a temp socket, the same
    /// way `runner`'s `main` does, and returns the shutdown flag plus a
    /// connected client.
    fn start_server(socket_path: &std::path::Path, db_path: &std::path::Path) -> Arc<AtomicBool> {
        let driver = Arc::new(SqliteDriver::connect(db_path.to_path_buf()).unwrap());
        let queue = Arc::new(dbrelay_queue::RequestQueue::new(100, Some(Duration::from_secs(5))));
        let listener = dbrelay_wire::bind(socket_path).unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        dbrelay_server::server::spawn(
            listener,
            driver,
            None,
            queue,
            2,
            Duration::from_secs(5),
            shutdown.clone(),
        );
        shutdown
    }

    #[test]
    fn create_then_get_then_list_project_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("dbrelay.sock");
        let db_path = dir.path().join("test.db");
        let shutdown = start_server(&socket_path, &db_path);
        thread::sleep(Duration::from_millis(50));

        let rpc = RpcClient::new(socket_path.clone());
        rpc.connect().unwrap();

        let ops = Operations::new(&rpc);
        ops.execute(
            "CREATE TABLE projects (id TEXT PRIMARY KEY, root_path TEXT, name TEXT, created_at INTEGER, updated_at INTEGER)",
            None,
            None,
        )
        .unwrap();

        let api = ClientApi::new(&rpc);
        let project = api.create_project("p1", "/srv/repo", Some("demo")).unwrap();
        assert_eq!(project.id, "p1");
        assert_eq!(project.root_path, "/srv/repo");
        assert!(project.created_at > 0);

        let fetched = api.get_project("p1").unwrap().unwrap();
        assert_eq!(fetched, project);

        let all = api.list_projects().unwrap();
        assert_eq!(all.len(), 1);

        let updated = api
            .update_project("p1", ProjectUpdate { root_path: None, name: Some(Some("renamed".into())) })
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("renamed"));

        assert!(api.delete_project("p1").unwrap());
        assert!(api.get_project("p1").unwrap().is_none());
        shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[test]
    fn files_and_trees_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("dbrelay.sock");
        let db_path = dir.path().join("test.db");
        let shutdown = start_server(&socket_path, &db_path);
        thread::sleep(Duration::from_millis(50));

        let rpc = RpcClient::new(socket_path.clone());
        rpc.connect().unwrap();
        let ops = Operations::new(&rpc);
        ops.execute(
            "CREATE TABLE files (id INTEGER PRIMARY KEY, project_id TEXT, path TEXT, \
             needs_chunking INTEGER, deleted INTEGER, created_at INTEGER DEFAULT (strftime('%s','now')), \
             updated_at INTEGER DEFAULT (strftime('%s','now')))",
            None,
            None,
        )
        .unwrap();
        ops.execute(
            "CREATE TABLE ast_trees (file_id INTEGER PRIMARY KEY, tree_json TEXT, updated_at INTEGER)",
            None,
            None,
        )
        .unwrap();

        let api = ClientApi::new(&rpc);
        let file = api.create_file("p1", "src/lib.rs").unwrap();
        assert_eq!(file.path, "src/lib.rs");
        assert!(file.needs_chunking);
        assert!(!file.deleted);

        api.save_ast(file.id, "{\"kind\":\"module\"}").unwrap();
        let ast = api.get_ast(file.id).unwrap();
        assert_eq!(ast.as_deref(), Some("{\"kind\":\"module\"}"));

        let files = api.get_project_files("p1", false).unwrap();
        assert_eq!(files.len(), 1);

        assert!(api.delete_file(file.id).unwrap());
        let remaining = api.get_project_files("p1", false).unwrap();
        assert!(remaining.is_empty());
        let including_deleted = api.get_project_files("p1", true).unwrap();
        assert_eq!(including_deleted.len(), 1);
        shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}
