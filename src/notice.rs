use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Human-readable notification for the toast/alert collaborator.
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub detail: String,
}

#[derive(Clone)]
pub struct NoticeSender {
    tx: UnboundedSender<Notice>,
}

impl NoticeSender {
    pub fn channel() -> (Self, UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn success<T: Into<String>, D: Into<String>>(&self, title: T, detail: D) {
        self.send(NoticeKind::Success, title.into(), detail.into());
    }

    pub fn error<T: Into<String>, D: Into<String>>(&self, title: T, detail: D) {
        self.send(NoticeKind::Error, title.into(), detail.into());
    }

    fn send(&self, kind: NoticeKind, title: String, detail: String) {
        // The receiver may already be gone during teardown; nothing to do then.
        let _ = self.tx.send(Notice {
            kind,
            title,
            detail,
        });
    }
}
