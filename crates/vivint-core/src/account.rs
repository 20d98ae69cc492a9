// ── Account orchestration ──
//
// The account owns the API client, the realtime stream, and the system
// graph. Graph mutations happen under one async mutex and never straddle
// a suspension point: push messages are pumped through a single consumer
// task (preserving receive order), and arrival settles are separate
// tasks tied to the account's cancellation token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::devices::alarm_panel::DEVICE_DISCOVERED;
use crate::system::{SettleRequest, System};
use vivint_api::models::AuthUserData;
use vivint_api::realtime::MessageCallback;
use vivint_api::transport::SessionCookie;
use vivint_api::{ApiEndpoints, Error, SkyClient, SkyConfig, SkyStream};

/// Raw-message observer invoked after the graph has absorbed a push.
pub type MessageTap = Arc<dyn Fn(&Value) + Send + Sync>;

/// Credentials and wiring for an [`Account`].
#[derive(Default)]
pub struct AccountConfig {
    pub username: String,
    pub password: Option<SecretString>,
    pub refresh_token: Option<String>,
    /// Session cookies from an interrupted MFA login.
    pub cookies: Vec<SessionCookie>,
    /// PKCE verifier from an interrupted MFA login.
    pub code_verifier: Option<String>,
    pub endpoints: ApiEndpoints,
    /// Override the realtime service origin (tests).
    pub stream_origin: Option<String>,
}

#[derive(Default)]
pub struct AccountState {
    pub systems: Vec<System>,
}

/// A connected Sky account: API client + realtime stream + system graph.
///
/// Cheaply cloneable; clones share all state. Intended lifetime is one
/// login session — `disconnect` tears down every background task.
#[derive(Clone)]
pub struct Account {
    api: SkyClient,
    stream: Arc<SkyStream>,
    state: Arc<Mutex<AccountState>>,
    taps: Arc<std::sync::Mutex<Vec<MessageTap>>>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    load_devices: Arc<AtomicBool>,
}

impl Account {
    pub fn new(config: AccountConfig) -> Result<Self, Error> {
        let api = SkyClient::new(SkyConfig {
            username: config.username,
            password: config.password,
            refresh_token: config.refresh_token,
            cookies: config.cookies,
            code_verifier: config.code_verifier,
            endpoints: config.endpoints,
            ..SkyConfig::default()
        })?;
        let stream = match config.stream_origin {
            Some(origin) => SkyStream::with_origin(origin),
            None => SkyStream::new(),
        };

        Ok(Self {
            api,
            stream: Arc::new(stream),
            state: Arc::new(Mutex::new(AccountState::default())),
            taps: Arc::new(std::sync::Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
            connected: Arc::new(AtomicBool::new(false)),
            load_devices: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn api(&self) -> &SkyClient {
        &self.api
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The upstream refresh token from the newest grant.
    pub fn refresh_token(&self) -> Option<String> {
        self.api.refresh_token()
    }

    /// Lock the system graph for reading or mutation.
    pub async fn state(&self) -> MutexGuard<'_, AccountState> {
        self.state.lock().await
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect to the Sky cloud. Optionally subscribe the realtime
    /// channel and eagerly load the full system graph.
    pub async fn connect(
        &self,
        load_devices: bool,
        subscribe_for_realtime_updates: bool,
    ) -> Result<AuthUserData, Error> {
        debug!("connecting to the Sky cloud");
        self.load_devices.store(load_devices, Ordering::SeqCst);

        let authuser = self.api.connect().await?;
        self.connected.store(true, Ordering::SeqCst);

        if subscribe_for_realtime_updates {
            debug!("subscribing for realtime updates");
            self.subscribe_for_realtime_updates(&authuser).await?;
        }
        if load_devices {
            debug!("loading devices");
            self.refresh(Some(&authuser)).await?;
        }
        Ok(authuser)
    }

    /// Complete a pending MFA challenge, then load devices if `connect`
    /// was asked to.
    pub async fn verify_mfa(&self, code: &str) -> Result<(), Error> {
        self.api.verify_mfa(code).await?;
        if self.load_devices.load(Ordering::SeqCst) {
            debug!("loading devices");
            self.refresh(None).await?;
        }
        Ok(())
    }

    /// Tear down the stream, tasks, and session. Idempotent.
    pub async fn disconnect(&self) {
        debug!("disconnecting from the Sky cloud");
        self.cancel.cancel();
        if self.connected.swap(false, Ordering::SeqCst) {
            self.stream.disconnect().await;
        }
        self.api.disconnect();
    }

    // ── Graph loading ────────────────────────────────────────────────

    /// (Re)load every system the user can reach. Existing systems are
    /// refreshed in place; new ones are appended.
    pub async fn refresh(&self, authuser: Option<&AuthUserData>) -> Result<(), Error> {
        let fetched;
        let authuser = match authuser {
            Some(authuser) => authuser,
            None => {
                fetched = self.api.get_authuser_data().await?;
                &fetched
            }
        };
        let Some(user) = authuser.primary_user() else {
            return Ok(());
        };

        for auth_system in &user.systems {
            let system_data = self.api.get_system_data(auth_system.panid).await?;
            let raw = system_data.to_raw();

            let mut state = self.state.lock().await;
            match state
                .systems
                .iter_mut()
                .find(|system| system.id() == auth_system.panid)
            {
                Some(system) => system.apply_refresh(raw),
                None => state.systems.push(System::new(
                    raw,
                    auth_system.sn.clone().unwrap_or_default(),
                    auth_system.ad.unwrap_or(false),
                )),
            }
        }

        debug!(count = user.systems.len(), "refreshed system(s)");
        Ok(())
    }

    // ── Realtime ─────────────────────────────────────────────────────

    /// Subscribe the realtime channel. Messages flow through a single
    /// pump task: graph mutation first, then the registered taps, all in
    /// receive order.
    pub async fn subscribe_for_realtime_updates(
        &self,
        authuser: &AuthUserData,
    ) -> Result<(), Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let callback: MessageCallback = Arc::new(move |message| {
            let _ = tx.send(message);
        });

        self.stream.connect().await?;
        self.stream.subscribe(authuser, callback).await;

        let account = self.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    message = rx.recv() => {
                        let Some(message) = message else { return };
                        account.handle_message(&message).await;
                        let taps: Vec<MessageTap> =
                            account.taps.lock().expect("taps lock poisoned").clone();
                        for tap in taps {
                            tap(&message);
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Observe raw push messages after the graph has absorbed them.
    pub fn add_message_tap(&self, tap: MessageTap) {
        self.taps.lock().expect("taps lock poisoned").push(tap);
    }

    /// Route one push message into the graph by its panel id, spawning
    /// an arrival settle per newly created device.
    pub async fn handle_message(&self, message: &Value) {
        let Some(map) = message.as_object() else {
            debug!("dropping non-object push message");
            return;
        };
        let Some(panel_id) = map.get("panid").and_then(Value::as_i64) else {
            debug!("push message ignored (no panel id)");
            return;
        };

        let settles = {
            let mut state = self.state.lock().await;
            let Some(system) = state.systems.iter_mut().find(|s| s.id() == panel_id) else {
                debug!(panel_id, "no system for push message");
                return;
            };
            system.handle_message(map)
        };

        for request in settles {
            self.spawn_settle(request);
        }
    }

    // ── Device-arrival settle ────────────────────────────────────────

    fn spawn_settle(&self, request: SettleRequest) {
        let account = self.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            account.settle_new_device(request, cancel).await;
        });
    }

    /// Poll a newly created device until it reports valid, then fetch
    /// its full payload and fold it into the panel. Aborts if the id
    /// lands in the unregistered map first, or on cancellation.
    async fn settle_new_device(&self, request: SettleRequest, cancel: CancellationToken) {
        loop {
            {
                let state = self.state.lock().await;
                let Some(panel) = state
                    .systems
                    .iter()
                    .find(|s| s.id() == request.panel_id)
                    .and_then(|s| s.panel(request.partition_id))
                else {
                    return;
                };
                if panel.unregistered_devices.contains_key(&request.device_id) {
                    return;
                }
                let Some(device) = panel.device(request.device_id) else {
                    return;
                };
                if device.is_valid() {
                    break;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }

        match self
            .api
            .get_device_data(request.panel_id, request.device_id)
            .await
        {
            Ok(system_data) => {
                let Some(partition) = system_data
                    .system
                    .par
                    .first()
                    .and_then(Value::as_object)
                    .cloned()
                else {
                    return;
                };
                let mut state = self.state.lock().await;
                let Some(panel) = state
                    .systems
                    .iter_mut()
                    .find(|s| s.id() == request.panel_id)
                    .and_then(|s| s.panel_mut(request.partition_id))
                else {
                    return;
                };
                panel.refresh(&partition, true);
                panel.emit(
                    DEVICE_DISCOVERED,
                    json!({ "device_id": request.device_id }),
                );
            }
            Err(err) => {
                error!(
                    device_id = request.device_id,
                    error = %err,
                    "error getting new device data"
                );
            }
        }
    }
}
