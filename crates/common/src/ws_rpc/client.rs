/// 网关 WebSocket RPC 客户端
///
/// 在一条长连接上复用并发请求，按 echo 关联响应，转发推送事件，断线后按退避策略自动重连

use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::codec::{self, Payload};
use super::events::{
    BotIdCallback, ConnectionEvent, ConnectionListener, ConnectionState, EventHandler, Listeners,
};
use super::message::{lifecycle_self_id, ActionRequest, Inbound};
use super::pending::PendingRequests;
use super::{ClientConfig, RpcError};

/// 会话使用的双向帧通道，正常运行时就是 WebSocket 连接
trait Transport:
    Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Send + Unpin + 'static
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Send + Unpin + 'static
{
}

/// 一次连接尝试的共享结果
type ConnectOutcome = Shared<BoxFuture<'static, Result<(), RpcError>>>;

/// 一条已建立的 socket
struct Session {
    /// 会话 ID，用于识别已被替换的旧 socket
    id: Uuid,

    /// 写任务的发送通道
    sender: mpsc::UnboundedSender<WsMessage>,

    /// 读任务
    reader: JoinHandle<()>,
}

impl Session {
    /// 主动关闭：尽力发送 close 帧，并摘除读任务，旧 socket 不再回调
    fn close(self) {
        let _ = self.sender.send(WsMessage::Close(None));
        self.reader.abort();
    }
}

/// 连接生命周期状态，所有转换都在同一把锁内完成
struct Lifecycle {
    state: ConnectionState,

    /// 当前 socket
    session: Option<Session>,

    /// 进行中的连接尝试
    connecting: Option<ConnectOutcome>,

    /// 进行中连接尝试的任务句柄
    attempt_abort: Option<AbortHandle>,

    /// 连接尝试序号，用于丢弃过期尝试的结果
    attempt_seq: u64,

    /// 重连定时器，同一时刻最多一个
    reconnect_timer: Option<JoinHandle<()>>,

    /// 连续失败次数
    attempts: u32,

    /// 调用过 disconnect()，不再自动重连
    manual_close: bool,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session: None,
            connecting: None,
            attempt_abort: None,
            attempt_seq: 0,
            reconnect_timer: None,
            attempts: 0,
            manual_close: false,
        }
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Lifecycle {
    /// 所有客户端句柄都已释放：停止定时器与连接尝试，关闭 socket
    fn drop(&mut self) {
        self.cancel_reconnect_timer();
        if let Some(attempt) = self.attempt_abort.take() {
            attempt.abort();
        }
        if let Some(session) = self.session.take() {
            debug!("客户端已释放，关闭连接: session={}", session.id);
            session.close();
        }
    }
}

struct Inner {
    config: ClientConfig,
    handler: Arc<dyn EventHandler>,
    on_bot_id: Option<BotIdCallback>,
    lifecycle: Mutex<Lifecycle>,
    pending: PendingRequests,
    listeners: Listeners,
}

/// 网关客户端
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

impl GatewayClient {
    /// 创建新的客户端（不会立即连接）
    pub fn new(
        config: ClientConfig,
        handler: Arc<dyn EventHandler>,
        on_bot_id: Option<BotIdCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                handler,
                on_bot_id,
                lifecycle: Mutex::new(Lifecycle::new()),
                pending: PendingRequests::new(),
                listeners: Listeners::new(),
            }),
        }
    }

    /// 注册生命周期监听器
    pub async fn on<F>(&self, listener: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let listener: ConnectionListener = Arc::new(listener);
        self.inner.listeners.add(listener).await;
    }

    /// 建立连接
    ///
    /// 已连接时直接返回；已有连接尝试在进行时，与其共享同一个结果
    pub async fn connect(&self) -> Result<(), RpcError> {
        let outcome = {
            let mut lc = self.inner.lifecycle.lock().await;
            if lc.state == ConnectionState::Connected {
                return Ok(());
            }
            lc.manual_close = false;
            match lc.connecting.clone() {
                Some(outcome) => {
                    debug!("复用进行中的连接尝试");
                    outcome
                }
                None => self.inner.begin_attempt(&mut lc, ConnectionState::Connecting),
            }
        };
        outcome.await
    }

    /// 主动断开，不会自动重连，直到下一次 connect()
    pub async fn disconnect(&self) {
        let mut lc = self.inner.lifecycle.lock().await;
        lc.manual_close = true;
        lc.cancel_reconnect_timer();

        lc.attempt_seq += 1;
        lc.connecting = None;
        if let Some(attempt) = lc.attempt_abort.take() {
            attempt.abort();
        }

        if let Some(session) = lc.session.take() {
            info!("主动断开连接: session={}", session.id);
            session.close();
        }
        lc.state = ConnectionState::Disconnected;

        let drained = self.inner.pending.fail_all(RpcError::connection_closed()).await;
        if drained > 0 {
            warn!("断开连接，拒绝 {} 个待处理请求", drained);
        }
    }

    /// 发送请求并等待响应，成功时返回响应中的 data 字段
    pub async fn send_request(&self, action: &str, params: Value) -> Result<Value, RpcError> {
        let echo = self.inner.pending.next_echo();
        let frame = codec::encode(&ActionRequest::new(action, params, echo.clone()))?;
        let on_timeout = RpcError::timeout(format!("请求超时: action={}, echo={}", action, echo));

        let rx = {
            let lc = self.inner.lifecycle.lock().await;
            let session = match (&lc.state, &lc.session) {
                (ConnectionState::Connected, Some(session)) => session,
                _ => return Err(RpcError::not_connected()),
            };

            let rx = self
                .inner
                .pending
                .register(&echo, self.inner.config.request_timeout, on_timeout)
                .await;
            if session.sender.send(frame).is_err() {
                self.inner.pending.remove(&echo).await;
                return Err(RpcError::transport("写入 socket 失败"));
            }
            rx
        };
        debug!("📤 发送请求: action={}, echo={}", action, echo);

        // 超时由等待器自己的计时器处理，调用方中途放弃时条目也会按时清除
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RpcError::connection_closed()),
        }
    }

    /// 是否已连接
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// 获取当前状态
    pub async fn state(&self) -> ConnectionState {
        self.inner.lifecycle.lock().await.state
    }

    /// 获取待处理请求数量
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.len().await
    }

    /// 自上次成功连接以来的失败次数
    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.lifecycle.lock().await.attempts
    }
}

impl Inner {
    /// 开始一次连接尝试，调用方必须持有生命周期锁
    fn begin_attempt(self: &Arc<Self>, lc: &mut Lifecycle, state: ConnectionState) -> ConnectOutcome {
        lc.cancel_reconnect_timer();
        lc.state = state;
        lc.attempt_seq += 1;

        let seq = lc.attempt_seq;
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.open(seq).await });
        lc.attempt_abort = Some(task.abort_handle());

        let outcome = async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(RpcError::connection_closed()),
                Err(e) => Err(RpcError::internal_error(format!("连接任务异常: {}", e))),
            }
        }
        .boxed()
        .shared();
        lc.connecting = Some(outcome.clone());
        outcome
    }

    /// 打开 socket 并安装会话
    async fn open(self: Arc<Self>, seq: u64) -> Result<(), RpcError> {
        info!("尝试连接到网关: {}", self.config.url);

        let opened = match self.build_request() {
            Ok(request) => {
                // 超时后握手 future 被丢弃，未完成的 socket 随之关闭
                match tokio::time::timeout(self.config.connect_timeout, connect_async(request)).await {
                    Ok(Ok((stream, _))) => Ok(stream),
                    Ok(Err(e)) => Err(RpcError::from(e)),
                    Err(_) => Err(RpcError::timeout(format!(
                        "连接超时: {}ms",
                        self.config.connect_timeout.as_millis()
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        match opened {
            Ok(stream) => self.on_open(seq, stream).await,
            Err(err) => {
                self.on_open_failed(seq, err.clone()).await;
                Err(err)
            }
        }
    }

    fn build_request(
        &self,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, RpcError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(RpcError::from)?;

        if let Some(token) = &self.config.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| RpcError::invalid_request(format!("无效的 access token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }

    async fn on_open<T: Transport>(self: &Arc<Self>, seq: u64, stream: T) -> Result<(), RpcError> {
        let mut lc = self.lifecycle.lock().await;
        if lc.attempt_seq != seq || lc.manual_close {
            // 该尝试已被 disconnect() 取代，丢弃刚建立的 socket
            debug!("丢弃过期的连接尝试: seq={}", seq);
            return Err(RpcError::connection_closed());
        }

        if let Some(stale) = lc.session.take() {
            stale.close();
        }

        let session = self.start_session(stream);
        info!("✅ WebSocket 连接成功: session={}", session.id);
        lc.session = Some(session);
        lc.state = ConnectionState::Connected;
        lc.attempts = 0;
        lc.connecting = None;
        lc.attempt_abort = None;
        drop(lc);

        self.listeners.emit(ConnectionEvent::Connect).await;
        Ok(())
    }

    async fn on_open_failed(self: &Arc<Self>, seq: u64, err: RpcError) {
        let mut lc = self.lifecycle.lock().await;
        if lc.attempt_seq != seq {
            debug!("忽略过期连接尝试的失败: seq={}, error={}", seq, err);
            return;
        }

        error!("连接网关失败: {}", err);
        lc.state = ConnectionState::Disconnected;
        lc.connecting = None;
        lc.attempt_abort = None;
        self.pending.fail_all(RpcError::connection_closed()).await;
        if !lc.manual_close {
            self.schedule_reconnect(&mut lc);
        }
        drop(lc);

        self.listeners.emit(ConnectionEvent::ConnectError(err)).await;
    }

    /// 拆分 socket，启动读写任务
    fn start_session<T: Transport>(self: &Arc<Self>, stream: T) -> Session {
        let id = Uuid::new_v4();
        let (ws_sender, ws_receiver) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
        let write_failed = Arc::new(Notify::new());

        tokio::spawn(write_loop(id, ws_sender, rx, write_failed.clone()));
        let reader = tokio::spawn(read_loop(Arc::downgrade(self), id, ws_receiver, write_failed));

        Session {
            id,
            sender: tx,
            reader,
        }
    }

    /// socket 意外关闭
    async fn on_session_closed(self: &Arc<Self>, session_id: Uuid) {
        let mut lc = self.lifecycle.lock().await;
        if lc.session.as_ref().map(|s| s.id) != Some(session_id) {
            debug!("忽略已替换 socket 的关闭事件: session={}", session_id);
            return;
        }

        // 由读任务自身调用，这里只释放句柄，不能 abort
        lc.session = None;
        let was_connected = lc.state == ConnectionState::Connected;
        lc.state = ConnectionState::Disconnected;

        let drained = self.pending.fail_all(RpcError::connection_closed()).await;
        warn!("连接断开: session={}, 拒绝 {} 个待处理请求", session_id, drained);

        if !lc.manual_close {
            self.schedule_reconnect(&mut lc);
        }
        drop(lc);

        if was_connected {
            self.listeners.emit(ConnectionEvent::Disconnect).await;
        }
    }

    /// 按退避策略安排下一次重连，调用方必须持有生命周期锁
    fn schedule_reconnect(self: &Arc<Self>, lc: &mut Lifecycle) {
        lc.cancel_reconnect_timer();

        let delay = self.config.reconnect.delay_for_attempt(lc.attempts);
        lc.attempts = lc.attempts.saturating_add(1);
        warn!("{}ms 后重新连接 (第 {} 次)", delay.as_millis(), lc.attempts);

        let weak: Weak<Self> = Arc::downgrade(self);
        lc.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.reconnect().await;
            }
        }));
    }

    /// 重连定时器触发
    async fn reconnect(self: &Arc<Self>) {
        let mut lc = self.lifecycle.lock().await;
        // 定时器就是当前任务，只释放句柄
        lc.reconnect_timer = None;

        if lc.manual_close || lc.state != ConnectionState::Disconnected || lc.connecting.is_some() {
            return;
        }

        // 重连对调用方是 fire-and-forget，结果通过生命周期通知观察
        let _ = self.begin_attempt(&mut lc, ConnectionState::Reconnecting);
    }

    /// 归一化、解码并分发一帧入站数据
    async fn dispatch(&self, payload: Payload) {
        let kind = payload.kind();
        let text = match codec::normalize(payload).await {
            Ok(text) => text,
            Err(e) => {
                warn!("丢弃无法归一化的入站数据: kind={}, error={}", kind, e);
                return;
            }
        };

        let inbound = match Inbound::parse(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("丢弃无法解析的入站数据: {}", e);
                return;
            }
        };

        match inbound {
            Inbound::Response(response) => {
                let echo = response.echo_key();
                debug!("📥 收到响应: echo={}, status={}", echo, response.status);
                if !self.pending.settle(response).await {
                    debug!("未找到对应的待响应请求: {}", echo);
                }
            }
            Inbound::Event(event) => {
                if let (Some(on_bot_id), Some(self_id)) = (&self.on_bot_id, lifecycle_self_id(&event)) {
                    info!("获取到机器人 ID: {}", self_id);
                    on_bot_id(self_id);
                }

                let handler = Arc::clone(&self.handler);
                tokio::spawn(async move {
                    if let Err(e) = handler.on_event(event).await {
                        error!("处理推送事件失败: {:#}", e);
                    }
                });
            }
            Inbound::Unrecognized(value) => {
                warn!("丢弃无法识别的入站消息: {}", value);
            }
        }
    }
}

/// 写任务：串行写出发送通道中的帧
async fn write_loop<S>(
    session_id: Uuid,
    mut ws_sender: S,
    mut rx: mpsc::UnboundedReceiver<WsMessage>,
    write_failed: Arc<Notify>,
) where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, WsMessage::Close(_));
        if let Err(e) = ws_sender.send(msg).await {
            error!("发送消息失败: session={}, error={}", session_id, e);
            write_failed.notify_one();
            return;
        }
        if is_close {
            break;
        }
    }
    let _ = ws_sender.close().await;
    debug!("发送任务结束: session={}", session_id);
}

/// 读任务：逐帧分发，socket 结束后上报关闭
///
/// 只持有客户端的弱引用，客户端释放后读任务随之结束
async fn read_loop<S>(
    inner: Weak<Inner>,
    session_id: Uuid,
    mut ws_receiver: S,
    write_failed: Arc<Notify>,
) where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(WsMessage::Close(frame))) => {
                    info!("收到连接关闭消息: session={}, frame={:?}", session_id, frame);
                    break;
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                    // 由 tungstenite 自动回复
                }
                Some(Ok(msg)) => match inner.upgrade() {
                    Some(inner) => inner.dispatch(Payload::from(msg)).await,
                    None => break,
                },
                Some(Err(e)) => {
                    // 错误本身不改变状态，这里结束读取以触发关闭流程
                    warn!("接收消息错误: session={}, error={}", session_id, e);
                    break;
                }
                None => break,
            },
            _ = write_failed.notified() => {
                warn!("写入失败，关闭 socket: session={}", session_id);
                break;
            }
        }
    }

    debug!("接收任务结束: session={}", session_id);
    if let Some(inner) = inner.upgrade() {
        inner.on_session_closed(session_id).await;
    }
}
