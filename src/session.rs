//! 会话存储
//!
//! 令牌保存在 [`SessionStorage`] 中，每次读取时重新解码身份。
//! 解码出的角色只用于界面提示，服务端会重新校验每个请求。
//!
//! 变更通知是显式的：[`SessionStore::on_change`] 注册的监听器在
//! `save`/`clear` 内同步执行。共享同一存储的多个上下文挂在同一条
//! [`SessionBus`] 上，一个上下文的变更会同步推送给其余上下文的监听器。

use crate::error::{ClientError, ClientResult};
use crate::storage::SessionStorage;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use parkspot_shared::{Role, UserId};
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use uuid::Uuid;

pub const STORAGE_TOKEN_KEY: &str = "authToken";

// =========================================================
// 会话
// =========================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub role: Role,
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: UserId,
    account_type: Role,
}

impl Session {
    /// 不校验签名，直接解码令牌载荷
    ///
    /// 过期令牌视为无效；没有 `exp` 的令牌照常接受。
    pub fn from_token(token: &str) -> ClientResult<Self> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| ClientError::auth(format!("undecodable session token: {}", e)))?;

        Ok(Self {
            token: token.to_string(),
            role: data.claims.account_type,
            user_id: data.claims.sub,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// `Authorization` 请求头的值
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// =========================================================
// 上下文与变更总线
// =========================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Saved,
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Rc<dyn Fn(Option<&Session>)>;

/// 单个上下文的状态：存储句柄和监听器表
struct Context {
    id: Uuid,
    storage: Rc<dyn SessionStorage>,
    listeners: RefCell<Vec<(SubscriptionId, Listener)>>,
    next_listener: Cell<u64>,
}

impl Context {
    fn load(&self) -> Option<Session> {
        let token = match self.storage.get(STORAGE_TOKEN_KEY) {
            Ok(Some(token)) if !token.trim().is_empty() => token,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "session storage unreadable, treating session as absent");
                return None;
            }
        };

        match Session::from_token(&token) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "stored token rejected, treating session as absent");
                None
            }
        }
    }

    fn notify(&self) {
        let current = self.load();
        // 先拍快照，监听器执行期间可以增删订阅
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener(current.as_ref());
        }
    }
}

/// 同一存储上所有上下文共用的变更总线
///
/// 只持有各上下文的弱引用，上下文释放后自动脱离。
#[derive(Clone, Default)]
pub struct SessionBus {
    peers: Rc<RefCell<Vec<Weak<Context>>>>,
}

impl SessionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前仍然存活的上下文数量
    pub fn contexts(&self) -> usize {
        self.peers.borrow().iter().filter(|p| p.strong_count() > 0).count()
    }

    fn join(&self, context: &Rc<Context>) {
        self.peers.borrow_mut().push(Rc::downgrade(context));
    }

    fn publish(&self, origin: Uuid, change: SessionChange) {
        let targets: Vec<Rc<Context>> = {
            let mut peers = self.peers.borrow_mut();
            peers.retain(|p| p.strong_count() > 0);
            peers
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|c| c.id != origin)
                .collect()
        };

        for target in targets {
            tracing::debug!(%origin, context = %target.id, ?change, "remote session change");
            target.notify();
        }
    }
}

// =========================================================
// 会话存储
// =========================================================

pub struct SessionStore {
    context: Rc<Context>,
    bus: SessionBus,
}

impl SessionStore {
    pub fn new(storage: Rc<dyn SessionStorage>, bus: SessionBus) -> Self {
        let context = Rc::new(Context {
            id: Uuid::new_v4(),
            storage,
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        });
        bus.join(&context);
        Self { context, bus }
    }

    /// 独占一条总线的存储，用于进程内只有一个上下文的场景
    pub fn standalone(storage: Rc<dyn SessionStorage>) -> Self {
        Self::new(storage, SessionBus::new())
    }

    pub fn context_id(&self) -> Uuid {
        self.context.id
    }

    /// 当前会话；令牌缺失、无法解码、已过期或存储不可读时返回 `None`
    pub fn load(&self) -> Option<Session> {
        self.context.load()
    }

    pub fn is_authenticated(&self) -> bool {
        self.load().is_some()
    }

    /// 保存新签发的令牌。无法解码的令牌会被拒绝，不写入任何内容。
    pub fn save(&self, token: &str) -> ClientResult<Session> {
        let session = Session::from_token(token).map_err(|e| e.in_op("session.save"))?;
        self.context
            .storage
            .set(STORAGE_TOKEN_KEY, token)
            .map_err(|e| e.in_op("session.save"))?;

        tracing::info!(user_id = session.user_id, role = %session.role, "session saved");
        self.broadcast(SessionChange::Saved);
        Ok(session)
    }

    pub fn clear(&self) -> ClientResult<()> {
        self.context
            .storage
            .delete(STORAGE_TOKEN_KEY)
            .map_err(|e| e.in_op("session.clear"))?;

        tracing::info!("session cleared");
        self.broadcast(SessionChange::Cleared);
        Ok(())
    }

    /// 注册监听器，每次变更后收到最新的会话
    pub fn on_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Option<&Session>) + 'static,
    {
        let ctx = &self.context;
        let id = SubscriptionId(ctx.next_listener.get());
        ctx.next_listener.set(id.0 + 1);
        ctx.listeners.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.context.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    fn broadcast(&self, change: SessionChange) {
        self.context.notify();
        self.bus.publish(self.context.id, change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::MemoryStorage;
    use crate::test_support::{expired_token, token};

    fn store_on(storage: &MemoryStorage, bus: &SessionBus) -> SessionStore {
        SessionStore::new(Rc::new(storage.clone()), bus.clone())
    }

    fn recorder(store: &SessionStore) -> Rc<RefCell<Vec<Option<Role>>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.on_change(move |s| sink.borrow_mut().push(s.map(|s| s.role)));
        seen
    }

    #[test]
    fn decodes_role_and_user_from_token() {
        let session = Session::from_token(&token(7, Role::Admin)).unwrap();
        assert_eq!(session.user_id, 7);
        assert!(session.is_admin());
        assert!(session.bearer().starts_with("Bearer "));
    }

    #[test]
    fn malformed_or_expired_tokens_read_as_absent() {
        let storage = MemoryStorage::new();
        let store = SessionStore::standalone(Rc::new(storage.clone()));

        storage.set(STORAGE_TOKEN_KEY, "not-a-jwt").unwrap();
        assert_eq!(store.load(), None);

        storage.set(STORAGE_TOKEN_KEY, &expired_token(1, Role::User)).unwrap();
        assert_eq!(store.load(), None);

        storage.set(STORAGE_TOKEN_KEY, &token(1, Role::User)).unwrap();
        assert_eq!(store.load().map(|s| s.user_id), Some(1));
    }

    #[test]
    fn undecodable_token_is_never_stored() {
        let storage = MemoryStorage::new();
        let store = SessionStore::standalone(Rc::new(storage.clone()));
        let seen = recorder(&store);

        let err = store.save("garbage").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(storage.get(STORAGE_TOKEN_KEY).unwrap(), None);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn save_and_clear_notify_synchronously() {
        let store = SessionStore::standalone(Rc::new(MemoryStorage::new()));
        let seen = recorder(&store);

        store.save(&token(2, Role::User)).unwrap();
        assert_eq!(*seen.borrow(), vec![Some(Role::User)]);

        store.clear().unwrap();
        assert_eq!(*seen.borrow(), vec![Some(Role::User), None]);
    }

    #[test]
    fn unsubscribed_listener_stays_quiet() {
        let store = SessionStore::standalone(Rc::new(MemoryStorage::new()));
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let id = store.on_change(move |_| counter.set(counter.get() + 1));

        store.save(&token(2, Role::User)).unwrap();
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.clear().unwrap();

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn remote_changes_reach_other_contexts_without_polling() {
        let storage = MemoryStorage::new();
        let bus = SessionBus::new();
        let tab_a = store_on(&storage, &bus);
        let tab_b = store_on(&storage, &bus);
        let seen_a = recorder(&tab_a);
        let seen_b = recorder(&tab_b);

        tab_a.save(&token(3, Role::Admin)).unwrap();
        assert_eq!(*seen_a.borrow(), vec![Some(Role::Admin)]);
        assert_eq!(*seen_b.borrow(), vec![Some(Role::Admin)]);

        tab_b.clear().unwrap();
        assert_eq!(*seen_a.borrow(), vec![Some(Role::Admin), None]);
        assert_eq!(*seen_b.borrow(), vec![Some(Role::Admin), None]);
        assert!(!tab_a.is_authenticated());
    }

    #[test]
    fn dropped_context_leaves_the_bus() {
        let storage = MemoryStorage::new();
        let bus = SessionBus::new();
        let tab_a = store_on(&storage, &bus);
        let tab_b = store_on(&storage, &bus);
        assert_eq!(bus.contexts(), 2);

        drop(tab_b);
        assert_eq!(bus.contexts(), 1);
        tab_a.save(&token(4, Role::User)).unwrap();
        assert!(tab_a.is_authenticated());
    }

    #[test]
    fn listener_may_write_back_during_remote_change() {
        let storage = MemoryStorage::new();
        let bus = SessionBus::new();
        let tab_a = store_on(&storage, &bus);
        let tab_b = Rc::new(store_on(&storage, &bus));
        let seen_a = recorder(&tab_a);

        // B 收到管理员会话就立即登出
        let weak_b = Rc::downgrade(&tab_b);
        tab_b.on_change(move |s| {
            if s.is_some_and(Session::is_admin) {
                if let Some(b) = weak_b.upgrade() {
                    b.clear().unwrap();
                }
            }
        });

        tab_a.save(&token(5, Role::Admin)).unwrap();
        assert_eq!(*seen_a.borrow(), vec![Some(Role::Admin), None]);
        assert!(!tab_a.is_authenticated());
    }
}
