//! 공유 SQLite 연결
//!
//! 블로킹 쿼리는 `spawn_blocking`에서 실행합니다. 호출한 future가 먼저 drop되면
//! (시그널 타임아웃, 요청 취소) 대기 중인 작업은 시작하지 않고,
//! 실행 중인 쿼리는 `sqlite3_interrupt`로 멈춰 연결 락을 곧바로 돌려줍니다.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{Connection, InterruptHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Queued,
    Running,
    Cancelled,
    Done,
}

/// 블로킹 작업 안에서 취소 여부 확인 (쿼리 사이 경계용)
pub struct TaskCheck {
    state: Arc<Mutex<TaskState>>,
    task: &'static str,
}

impl TaskCheck {
    pub fn check(&self) -> Result<()> {
        let state = self
            .state
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        if *state == TaskState::Cancelled {
            anyhow::bail!("{} cancelled", self.task);
        }
        Ok(())
    }
}

/// future가 완료 전에 drop되면 작업을 취소
struct CancelOnDrop {
    state: Arc<Mutex<TaskState>>,
    interrupt: Arc<InterruptHandle>,
    task: &'static str,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match *state {
            TaskState::Queued => {
                *state = TaskState::Cancelled;
                tracing::debug!("SQLite {} dropped before start", self.task);
            }
            TaskState::Running => {
                // 상태 락을 잡은 동안에는 작업이 연결을 놓지 않으므로 다른 요청의 쿼리는 건드리지 않음
                *state = TaskState::Cancelled;
                self.interrupt.interrupt();
                tracing::debug!("SQLite {} interrupted", self.task);
            }
            TaskState::Cancelled | TaskState::Done => {}
        }
    }
}

/// `Arc<Mutex<Connection>>` + 인터럽트 핸들
#[derive(Clone)]
pub struct SharedConnection {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SharedConnection {
    pub fn new(conn: Connection) -> Self {
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        }
    }

    /// 동기 접근 (스키마 초기화, 쓰기, 카운트)
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 블로킹 쿼리 실행 (취소 가능)
    pub async fn run<T, F>(&self, task: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &TaskCheck) -> Result<T> + Send + 'static,
    {
        let state = Arc::new(Mutex::new(TaskState::Queued));
        let _guard = CancelOnDrop {
            state: Arc::clone(&state),
            interrupt: Arc::clone(&self.interrupt),
            task,
        };
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

            let check = TaskCheck {
                state: Arc::clone(&state),
                task,
            };
            {
                let mut current = state
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
                if *current == TaskState::Cancelled {
                    anyhow::bail!("{} cancelled before start", task);
                }
                *current = TaskState::Running;
            }

            let result = f(&conn, &check);

            if let Ok(mut current) = state.lock() {
                *current = TaskState::Done;
            }
            result
        })
        .await
        .with_context(|| format!("SQLite {} task panicked", task))?
    }
}
