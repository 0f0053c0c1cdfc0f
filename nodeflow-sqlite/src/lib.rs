pub mod db;
pub mod schema;
pub mod store;

pub mod models {
    pub mod node_execution;
    pub mod workflow_execution;
}

pub mod crud {
    pub mod node_execution_crud;
    pub mod workflow_execution_crud;
}

pub mod persistence {
    pub mod mapping;
}

pub use store::SqliteExecutionStore;

#[macro_export]
macro_rules! tx_exec {
    ($tx:expr, $fn:ident($($arg:expr),*)) => {
        $fn(&mut *$tx, $($arg),*).await
    };
}
