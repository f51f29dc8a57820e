//! NetworkManager client over org.freedesktop.NetworkManager
//!
//! Reads the initial state, then turns signals and property changes into
//! [`NetEvent`]s on a channel. Per-object watcher tasks are aborted when
//! their object goes away.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};
use zbus::{proxy, Connection as Bus};

use crate::network::applet::AppletAction;
use crate::network::types::*;
use crate::network::{AccessPoint, ActiveConnection, Connection, Device, NetEvent};

const NETWORK_CONTROL: &str = "org.freedesktop.NetworkManager.network-control";

#[proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager"
)]
trait NetworkManager {
    fn get_devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    fn activate_connection(
        &self,
        connection: &ObjectPath<'_>,
        device: &ObjectPath<'_>,
        specific_object: &ObjectPath<'_>,
    ) -> zbus::Result<OwnedObjectPath>;

    fn add_and_activate_connection(
        &self,
        connection: HashMap<&str, HashMap<&str, Value<'_>>>,
        device: &ObjectPath<'_>,
        specific_object: &ObjectPath<'_>,
    ) -> zbus::Result<(OwnedObjectPath, OwnedObjectPath)>;

    fn deactivate_connection(&self, active_connection: &ObjectPath<'_>) -> zbus::Result<()>;

    fn check_connectivity(&self) -> zbus::Result<u32>;

    fn get_permissions(&self) -> zbus::Result<HashMap<String, String>>;

    #[zbus(signal)]
    fn device_added(&self, device_path: OwnedObjectPath) -> zbus::Result<()>;

    #[zbus(signal)]
    fn device_removed(&self, device_path: OwnedObjectPath) -> zbus::Result<()>;

    #[zbus(signal)]
    fn check_permissions(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn networking_enabled(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn wireless_enabled(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn state(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn connectivity(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn primary_connection(&self) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn activating_connection(&self) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn active_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/Settings"
)]
trait NmSettings {
    fn list_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    #[zbus(signal)]
    fn new_connection(&self, connection: OwnedObjectPath) -> zbus::Result<()>;

    #[zbus(signal)]
    fn connection_removed(&self, connection: OwnedObjectPath) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings.Connection",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmSettingsConnection {
    fn get_settings(&self) -> zbus::Result<HashMap<String, HashMap<String, OwnedValue>>>;

    #[zbus(signal)]
    fn updated(&self) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmDevice {
    fn disconnect(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn state_changed(&self, new_state: u32, old_state: u32, reason: u32) -> zbus::Result<()>;

    #[zbus(property)]
    fn udi(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn interface(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn device_type(&self) -> zbus::Result<u32>;

    #[zbus(property, name = "State")]
    fn current_state(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn hw_address(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn active_connection(&self) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn available_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wired",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmWired {
    #[zbus(property)]
    fn carrier(&self) -> zbus::Result<bool>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wireless",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmWireless {
    #[zbus(signal)]
    fn access_point_added(&self, access_point: OwnedObjectPath) -> zbus::Result<()>;

    #[zbus(signal)]
    fn access_point_removed(&self, access_point: OwnedObjectPath) -> zbus::Result<()>;

    #[zbus(property)]
    fn access_points(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    #[zbus(property)]
    fn active_access_point(&self) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn wireless_capabilities(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn mode(&self) -> zbus::Result<u32>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Modem",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmModem {
    #[zbus(property)]
    fn current_capabilities(&self) -> zbus::Result<u32>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Bluetooth",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmBluetooth {
    #[zbus(property)]
    fn name(&self) -> zbus::Result<String>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.AccessPoint",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmAccessPoint {
    #[zbus(property)]
    fn ssid(&self) -> zbus::Result<Vec<u8>>;

    #[zbus(property)]
    fn strength(&self) -> zbus::Result<u8>;

    #[zbus(property)]
    fn flags(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn wpa_flags(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn rsn_flags(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn mode(&self) -> zbus::Result<u32>;
}

// Separate module: both NmDevice and NmActive declare a `StateChanged` signal,
// and the proxy macro generates same-named types for each.
mod active {
    use super::*;

    #[proxy(
        interface = "org.freedesktop.NetworkManager.Connection.Active",
        default_service = "org.freedesktop.NetworkManager"
    )]
    pub(super) trait NmActive {
        #[zbus(signal, name = "StateChanged")]
        fn active_state_changed(&self, state: u32, reason: u32) -> zbus::Result<()>;

        #[zbus(property)]
        fn connection(&self) -> zbus::Result<OwnedObjectPath>;

        #[zbus(property)]
        fn uuid(&self) -> zbus::Result<String>;

        #[zbus(property, name = "Type")]
        fn connection_type(&self) -> zbus::Result<String>;

        #[zbus(property, name = "State")]
        fn current_state(&self) -> zbus::Result<u32>;

        #[zbus(property)]
        fn devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
    }
}
use active::NmActiveProxy;

type Events = UnboundedSender<NetEvent>;

/// `/` stands for "none" in NetworkManager object path properties
fn optional<T: for<'a> From<&'a str>>(path: &OwnedObjectPath) -> Option<T> {
    (path.as_str() != "/").then(|| T::from(path.as_str()))
}

fn object_path(path: Option<&str>) -> Result<ObjectPath<'_>> {
    ObjectPath::try_from(path.unwrap_or("/")).context("Invalid object path")
}

/// Forward a property stream as events until the receiver goes away
macro_rules! forward_property {
    ($tasks:expr, $stream:expr, $events:expr, |$value:ident| $event:expr) => {{
        let mut stream = $stream;
        let events = $events.clone();
        $tasks.push(tokio::spawn(async move {
            while let Some(change) = stream.next().await {
                match change.get().await {
                    Ok($value) => {
                        if events.send($event).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Failed to read changed property: {}", e),
                }
            }
        }));
    }};
}

/// Watcher tasks per D-Bus object
#[derive(Debug, Clone, Default)]
struct Watchers {
    tasks: Arc<Mutex<HashMap<String, Vec<JoinHandle<()>>>>>,
}

impl Watchers {
    fn add(&self, object: &str, tasks: Vec<JoinHandle<()>>) {
        if let Ok(mut map) = self.tasks.lock() {
            map.entry(object.to_string()).or_default().extend(tasks);
        }
    }

    fn remove(&self, object: &str) {
        let tasks = self.tasks.lock().ok().and_then(|mut map| map.remove(object));
        for task in tasks.into_iter().flatten() {
            task.abort();
        }
    }
}

/// Client side of NetworkManager
#[derive(Clone)]
pub struct NmClient {
    bus: Bus,
    nm: NetworkManagerProxy<'static>,
    events: Events,
    watchers: Watchers,
}

impl NmClient {
    pub async fn new(bus: &Bus, events: Events) -> Result<Self> {
        let nm = NetworkManagerProxy::new(bus)
            .await
            .context("Failed to create NetworkManager proxy")?;
        Ok(Self {
            bus: bus.clone(),
            nm,
            events,
            watchers: Watchers::default(),
        })
    }

    fn send(&self, event: NetEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    /// Send the current state and start watching for changes
    pub async fn start(&self) -> Result<()> {
        let running = self.nm.inner().get_property::<bool>("NetworkingEnabled").await.is_ok();
        self.send(NetEvent::NmRunning { running });
        if !running {
            warn!("NetworkManager is not running");
        }

        self.send_manager_state().await;
        self.send_permissions().await;

        let settings = NmSettingsProxy::new(&self.bus).await?;
        for path in settings.list_connections().await.unwrap_or_default() {
            self.add_connection(path.as_str()).await;
        }
        for path in self.nm.get_devices().await.unwrap_or_default() {
            self.add_device(path.as_str()).await;
        }
        let active = self.nm.active_connections().await.unwrap_or_default();
        for path in &active {
            self.add_active(path.as_str()).await;
        }
        // Primary connection last, once its active connection is known
        if let Ok(primary) = self.nm.primary_connection().await {
            self.send(NetEvent::PrimaryConnection { active: optional(&primary) });
        }
        if let Ok(activating) = self.nm.activating_connection().await {
            self.send(NetEvent::ActivatingConnection { active: optional(&activating) });
        }

        self.watch_manager(active.iter().map(|p| p.to_string()).collect()).await?;
        self.watch_settings(settings).await?;
        info!("NetworkManager client started");
        Ok(())
    }

    async fn send_manager_state(&self) {
        if let Ok(enabled) = self.nm.networking_enabled().await {
            self.send(NetEvent::NetworkingEnabled { enabled });
        }
        if let Ok(enabled) = self.nm.wireless_enabled().await {
            self.send(NetEvent::WirelessEnabled { enabled });
        }
        if let Ok(state) = self.nm.state().await {
            self.send(NetEvent::StateChanged { state: NmState(state) });
        }
        if let Ok(state) = self.nm.connectivity().await {
            self.send(NetEvent::Connectivity {
                state: ConnectivityState::from_raw(state),
            });
        }
    }

    async fn send_permissions(&self) {
        match self.nm.get_permissions().await {
            Ok(permissions) => {
                let allowed = permissions.get(NETWORK_CONTROL).is_some_and(|v| v == "yes");
                self.send(NetEvent::PermissionChanged { allowed });
            }
            Err(e) => {
                warn!("Failed to query NetworkManager permissions: {}", e);
                self.send(NetEvent::PermissionChanged { allowed: false });
            }
        }
    }

    async fn watch_manager(&self, initial_active: HashSet<String>) -> Result<()> {
        let mut tasks = Vec::new();
        let events = &self.events;

        let mut owner = self.nm.inner().receive_owner_changed().await?;
        let tx = events.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(owner) = owner.next().await {
                if tx.send(NetEvent::NmRunning { running: owner.is_some() }).is_err() {
                    break;
                }
            }
        }));

        forward_property!(tasks, self.nm.receive_networking_enabled_changed().await, events, |enabled| {
            NetEvent::NetworkingEnabled { enabled }
        });
        forward_property!(tasks, self.nm.receive_wireless_enabled_changed().await, events, |enabled| {
            NetEvent::WirelessEnabled { enabled }
        });
        forward_property!(tasks, self.nm.receive_state_changed().await, events, |state| {
            NetEvent::StateChanged { state: NmState(state) }
        });
        forward_property!(tasks, self.nm.receive_connectivity_changed().await, events, |state| {
            NetEvent::Connectivity {
                state: ConnectivityState::from_raw(state),
            }
        });
        forward_property!(tasks, self.nm.receive_primary_connection_changed().await, events, |path| {
            NetEvent::PrimaryConnection { active: optional(&path) }
        });
        forward_property!(tasks, self.nm.receive_activating_connection_changed().await, events, |path| {
            NetEvent::ActivatingConnection { active: optional(&path) }
        });

        let client = self.clone();
        let mut added = self.nm.receive_device_added().await?;
        tasks.push(tokio::spawn(async move {
            while let Some(signal) = added.next().await {
                if let Ok(args) = signal.args() {
                    client.add_device(args.device_path.as_str()).await;
                }
            }
        }));

        let client = self.clone();
        let mut removed = self.nm.receive_device_removed().await?;
        tasks.push(tokio::spawn(async move {
            while let Some(signal) = removed.next().await {
                if let Ok(args) = signal.args() {
                    let path = args.device_path.as_str();
                    client.watchers.remove(path);
                    client.send(NetEvent::DeviceRemoved { device: path.into() });
                }
            }
        }));

        let client = self.clone();
        let mut check = self.nm.receive_check_permissions().await?;
        tasks.push(tokio::spawn(async move {
            while check.next().await.is_some() {
                client.send_permissions().await;
            }
        }));

        // Active connections come and go through the property only
        let client = self.clone();
        let mut active = self.nm.receive_active_connections_changed().await;
        tasks.push(tokio::spawn(async move {
            let mut known = initial_active;
            while let Some(change) = active.next().await {
                let Ok(paths) = change.get().await else {
                    continue;
                };
                let current: HashSet<String> = paths.iter().map(|p| p.to_string()).collect();
                for gone in known.difference(&current) {
                    client.watchers.remove(gone);
                    client.send(NetEvent::ActiveConnectionRemoved {
                        active: gone.as_str().into(),
                    });
                }
                for new in current.difference(&known) {
                    client.add_active(new).await;
                }
                known = current;
            }
        }));

        self.watchers.add("/org/freedesktop/NetworkManager", tasks);
        Ok(())
    }

    async fn watch_settings(&self, settings: NmSettingsProxy<'static>) -> Result<()> {
        let mut tasks = Vec::new();

        let client = self.clone();
        let mut added = settings.receive_new_connection().await?;
        tasks.push(tokio::spawn(async move {
            while let Some(signal) = added.next().await {
                if let Ok(args) = signal.args() {
                    client.add_connection(args.connection.as_str()).await;
                }
            }
        }));

        let client = self.clone();
        let mut removed = settings.receive_connection_removed().await?;
        tasks.push(tokio::spawn(async move {
            while let Some(signal) = removed.next().await {
                if let Ok(args) = signal.args() {
                    let path = args.connection.as_str();
                    client.watchers.remove(path);
                    client.send(NetEvent::ConnectionRemoved { connection: path.into() });
                }
            }
        }));

        self.watchers.add("/org/freedesktop/NetworkManager/Settings", tasks);
        Ok(())
    }

    async fn add_connection(&self, path: &str) {
        let proxy = match self.settings_connection(path).await {
            Ok(proxy) => proxy,
            Err(e) => {
                warn!("Failed to watch connection {}: {}", path, e);
                return;
            }
        };
        match load_connection(&proxy, path).await {
            Ok(connection) => self.send(NetEvent::ConnectionAdded { connection }),
            Err(e) => {
                warn!("Failed to load connection {}: {}", path, e);
                return;
            }
        }

        let mut updated = match proxy.receive_updated().await {
            Ok(updated) => updated,
            Err(e) => {
                warn!("Failed to watch connection {}: {}", path, e);
                return;
            }
        };
        let client = self.clone();
        let object = path.to_string();
        let task = tokio::spawn(async move {
            while updated.next().await.is_some() {
                match load_connection(&proxy, &object).await {
                    Ok(connection) => client.send(NetEvent::ConnectionUpdated { connection }),
                    Err(e) => warn!("Failed to reload connection {}: {}", object, e),
                }
            }
        });
        self.watchers.add(path, vec![task]);
    }

    async fn settings_connection(&self, path: &str) -> Result<NmSettingsConnectionProxy<'static>> {
        Ok(NmSettingsConnectionProxy::builder(&self.bus)
            .path(path.to_string())?
            .build()
            .await?)
    }

    async fn add_device(&self, path: &str) {
        let device = match self.load_device(path).await {
            Ok(device) => device,
            Err(e) => {
                warn!("Failed to load device {}: {}", path, e);
                return;
            }
        };
        let device_type = device.device_type;
        self.send(NetEvent::DeviceAdded { device });

        let mut tasks = match self.watch_device(path, device_type == DeviceType::Ethernet).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Failed to watch device {}: {}", path, e);
                Vec::new()
            }
        };
        if device_type == DeviceType::Wifi {
            match self.watch_wireless(path).await {
                Ok(wifi) => tasks.extend(wifi),
                Err(e) => warn!("Failed to watch wireless device {}: {}", path, e),
            }
        }
        self.watchers.add(path, tasks);
    }

    async fn load_device(&self, path: &str) -> Result<Device> {
        let proxy = NmDeviceProxy::builder(&self.bus).path(path.to_string())?.build().await?;
        let device_type = DeviceType::from_raw(proxy.device_type().await?);
        let mut device = Device::new(path, device_type, &proxy.interface().await.unwrap_or_default());
        device.udi = proxy.udi().await.unwrap_or_default();
        device.hw_address = proxy.hw_address().await.ok().filter(|a| !a.is_empty());
        device.state = DeviceState(proxy.current_state().await.unwrap_or_default());
        device.active_connection = proxy.active_connection().await.ok().and_then(|p| optional(&p));
        device.available_connections = proxy
            .available_connections()
            .await
            .unwrap_or_default()
            .iter()
            .map(|p| p.as_str().into())
            .collect();

        match device_type {
            DeviceType::Ethernet => {
                let wired = NmWiredProxy::builder(&self.bus).path(path.to_string())?.build().await?;
                device.carrier = wired.carrier().await.unwrap_or(true);
            }
            DeviceType::Wifi => {
                let wifi = NmWirelessProxy::builder(&self.bus).path(path.to_string())?.build().await?;
                device.wireless_capabilities =
                    WifiCapabilities::from_bits_retain(wifi.wireless_capabilities().await.unwrap_or_default());
                device.mode = Mode80211::from_raw(wifi.mode().await.unwrap_or_default());
                device.active_access_point = wifi.active_access_point().await.ok().and_then(|p| optional(&p));
            }
            DeviceType::Modem => {
                let modem = NmModemProxy::builder(&self.bus).path(path.to_string())?.build().await?;
                device.modem_capabilities =
                    ModemCapabilities::from_bits_retain(modem.current_capabilities().await.unwrap_or_default());
            }
            DeviceType::Bluetooth => {
                let bt = NmBluetoothProxy::builder(&self.bus).path(path.to_string())?.build().await?;
                device.bt_name = bt.name().await.ok();
            }
            DeviceType::Other(_) => {}
        }
        Ok(device)
    }

    async fn watch_device(&self, path: &str, wired: bool) -> Result<Vec<JoinHandle<()>>> {
        let proxy = NmDeviceProxy::builder(&self.bus).path(path.to_string())?.build().await?;
        let device = DevicePath::from(path);
        let mut tasks = Vec::new();
        let events = &self.events;

        let mut changes = proxy.receive_state_changed().await?;
        let tx = events.clone();
        let dev = device.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(signal) = changes.next().await {
                let Ok(args) = signal.args() else {
                    continue;
                };
                let event = NetEvent::DeviceStateChanged {
                    device: dev.clone(),
                    new: DeviceState(args.new_state),
                    old: DeviceState(args.old_state),
                    reason: DeviceStateReason(args.reason),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        }));

        let dev = device.clone();
        forward_property!(tasks, proxy.receive_active_connection_changed().await, events, |active| {
            NetEvent::DeviceActiveConnection {
                device: dev.clone(),
                active: optional(&active),
            }
        });
        let dev = device.clone();
        forward_property!(tasks, proxy.receive_interface_changed().await, events, |interface| {
            NetEvent::DeviceInterface {
                device: dev.clone(),
                interface,
            }
        });
        let dev = device.clone();
        forward_property!(tasks, proxy.receive_available_connections_changed().await, events, |paths| {
            NetEvent::DeviceAvailableConnections {
                device: dev.clone(),
                connections: paths.iter().map(|p| p.as_str().into()).collect(),
            }
        });

        if wired {
            let wired = NmWiredProxy::builder(&self.bus).path(path.to_string())?.build().await?;
            let dev = device.clone();
            forward_property!(tasks, wired.receive_carrier_changed().await, events, |carrier| {
                NetEvent::DeviceCarrier {
                    device: dev.clone(),
                    carrier,
                }
            });
        }
        Ok(tasks)
    }

    async fn watch_wireless(&self, path: &str) -> Result<Vec<JoinHandle<()>>> {
        let wifi = NmWirelessProxy::builder(&self.bus).path(path.to_string())?.build().await?;
        let device = DevicePath::from(path);
        let mut tasks = Vec::new();

        for ap in wifi.access_points().await.unwrap_or_default() {
            self.add_access_point(&device, ap.as_str()).await;
        }

        let dev = device.clone();
        forward_property!(tasks, wifi.receive_active_access_point_changed().await, self.events, |ap| {
            NetEvent::DeviceActiveAccessPoint {
                device: dev.clone(),
                ap: optional(&ap),
            }
        });

        let client = self.clone();
        let dev = device.clone();
        let mut added = wifi.receive_access_point_added().await?;
        tasks.push(tokio::spawn(async move {
            while let Some(signal) = added.next().await {
                if let Ok(args) = signal.args() {
                    client.add_access_point(&dev, args.access_point.as_str()).await;
                }
            }
        }));

        let client = self.clone();
        let dev = device.clone();
        let mut removed = wifi.receive_access_point_removed().await?;
        tasks.push(tokio::spawn(async move {
            while let Some(signal) = removed.next().await {
                if let Ok(args) = signal.args() {
                    let ap = args.access_point.as_str();
                    client.watchers.remove(ap);
                    client.send(NetEvent::AccessPointRemoved {
                        device: dev.clone(),
                        ap: ap.into(),
                    });
                }
            }
        }));
        Ok(tasks)
    }

    async fn add_access_point(&self, device: &DevicePath, path: &str) {
        let result = async {
            let proxy = NmAccessPointProxy::builder(&self.bus).path(path.to_string())?.build().await?;
            let ap = load_access_point(&proxy, path).await?;
            Ok::<_, anyhow::Error>((proxy, ap))
        }
        .await;
        let (proxy, ap) = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                debug!("Failed to load access point {}: {}", path, e);
                return;
            }
        };
        self.send(NetEvent::AccessPointAdded {
            device: device.clone(),
            ap,
        });

        let mut tasks = Vec::new();
        let events = &self.events;
        let ap_path = ApPath::from(path);
        let path_for_strength = ap_path.clone();
        forward_property!(tasks, proxy.receive_strength_changed().await, events, |strength| {
            NetEvent::AccessPointStrength {
                ap: path_for_strength.clone(),
                strength,
            }
        });
        forward_property!(tasks, proxy.receive_ssid_changed().await, events, |ssid| {
            NetEvent::AccessPointSsid {
                ap: ap_path.clone(),
                ssid: (!ssid.is_empty()).then_some(ssid),
            }
        });
        self.watchers.add(path, tasks);
    }

    async fn add_active(&self, path: &str) {
        let proxy = match NmActiveProxy::builder(&self.bus).path(path.to_string()) {
            Ok(builder) => builder.build().await,
            Err(e) => Err(e),
        };
        let proxy = match proxy {
            Ok(proxy) => proxy,
            Err(e) => {
                warn!("Failed to create proxy for active connection {}: {}", path, e);
                return;
            }
        };
        let active = match load_active(&proxy, path).await {
            Ok(active) => active,
            Err(e) => {
                debug!("Active connection {} vanished: {}", path, e);
                return;
            }
        };
        self.send(NetEvent::ActiveConnectionAdded { active });

        let mut changes = match proxy.receive_active_state_changed().await {
            Ok(changes) => changes,
            Err(e) => {
                warn!("Failed to watch active connection {}: {}", path, e);
                return;
            }
        };
        let tx = self.events.clone();
        let active_path = ActivePath::from(path);
        let task = tokio::spawn(async move {
            while let Some(signal) = changes.next().await {
                let Ok(args) = signal.args() else {
                    continue;
                };
                let event = NetEvent::ActiveConnectionState {
                    active: active_path.clone(),
                    state: ActiveConnectionState::from_raw(args.state),
                    reason: ActiveConnectionStateReason(args.reason),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        self.watchers.add(path, vec![task]);
    }

    /// Carry out the NetworkManager side of an applet action. Actions for
    /// other services are ignored.
    pub async fn execute(&self, action: &AppletAction) -> Result<()> {
        match action {
            AppletAction::ActivateConnection {
                connection,
                device,
                specific_object,
            } => {
                self.nm
                    .activate_connection(
                        &object_path(Some(connection.as_str()))?,
                        &object_path(device.as_ref().map(DevicePath::as_str))?,
                        &object_path(specific_object.as_ref().map(ApPath::as_str))?,
                    )
                    .await
                    .with_context(|| format!("Failed to activate {}", connection))?;
            }
            AppletAction::AddAndActivate { device, access_point } => {
                self.nm
                    .add_and_activate_connection(
                        HashMap::new(),
                        &object_path(Some(device.as_str()))?,
                        &object_path(access_point.as_ref().map(ApPath::as_str))?,
                    )
                    .await
                    .with_context(|| format!("Failed to add a connection for {}", device))?;
            }
            AppletAction::DeactivateConnection { active } => {
                self.nm
                    .deactivate_connection(&object_path(Some(active.as_str()))?)
                    .await
                    .with_context(|| format!("Failed to deactivate {}", active))?;
            }
            AppletAction::DisconnectDevice { device } => {
                let proxy = NmDeviceProxy::builder(&self.bus)
                    .path(device.to_string())?
                    .build()
                    .await?;
                proxy
                    .disconnect()
                    .await
                    .with_context(|| format!("Failed to disconnect {}", device))?;
            }
            AppletAction::CheckConnectivity { connection } => {
                let state = ConnectivityState::from_raw(self.nm.check_connectivity().await?);
                self.send(NetEvent::ConnectivityCheckResult {
                    connection: connection.clone(),
                    state,
                });
            }
            _ => {}
        }
        Ok(())
    }
}

async fn load_access_point(proxy: &NmAccessPointProxy<'_>, path: &str) -> Result<AccessPoint> {
    let ssid = proxy.ssid().await.unwrap_or_default();
    let mut ap = AccessPoint::new(path, &ssid, proxy.strength().await?);
    ap.mode = Mode80211::from_raw(proxy.mode().await.unwrap_or_default());
    ap.flags = ApFlags::from_bits_retain(proxy.flags().await.unwrap_or_default());
    ap.wpa_flags = ApSecurityFlags::from_bits_retain(proxy.wpa_flags().await.unwrap_or_default());
    ap.rsn_flags = ApSecurityFlags::from_bits_retain(proxy.rsn_flags().await.unwrap_or_default());
    Ok(ap)
}

async fn load_active(proxy: &NmActiveProxy<'_>, path: &str) -> Result<ActiveConnection> {
    Ok(ActiveConnection {
        path: path.into(),
        connection: proxy.connection().await.ok().and_then(|p| optional(&p)),
        uuid: proxy.uuid().await?,
        conn_type: proxy.connection_type().await.unwrap_or_default(),
        state: ActiveConnectionState::from_raw(proxy.current_state().await?),
        reason: ActiveConnectionStateReason::NONE,
        devices: proxy
            .devices()
            .await
            .unwrap_or_default()
            .iter()
            .map(|p| p.as_str().into())
            .collect(),
    })
}

type Settings = HashMap<String, HashMap<String, OwnedValue>>;

fn setting<'a>(settings: &'a Settings, group: &str, key: &str) -> Option<&'a Value<'static>> {
    settings.get(group)?.get(key).map(Deref::deref)
}

fn string_setting(settings: &Settings, group: &str, key: &str) -> Option<String> {
    match setting(settings, group, key)? {
        Value::Str(s) => Some(s.as_str().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn bytes_setting(settings: &Settings, group: &str, key: &str) -> Option<Vec<u8>> {
    match setting(settings, group, key)? {
        Value::Array(array) => array
            .iter()
            .map(|v| match v {
                Value::U8(b) => Some(*b),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

async fn load_connection(proxy: &NmSettingsConnectionProxy<'_>, path: &str) -> Result<Connection> {
    let settings = proxy.get_settings().await?;
    let uuid = string_setting(&settings, "connection", "uuid").context("Connection has no UUID")?;
    let id = string_setting(&settings, "connection", "id").unwrap_or_default();
    let setting_type = string_setting(&settings, "connection", "type").unwrap_or_default();

    let mut connection = Connection::new(path, &uuid, &id, &setting_type);
    connection.master = string_setting(&settings, "connection", "master")
        .or_else(|| string_setting(&settings, "connection", "controller"));
    connection.interface_name = string_setting(&settings, "connection", "interface-name");
    connection.mac_address = bytes_setting(&settings, "802-3-ethernet", "mac-address")
        .or_else(|| bytes_setting(&settings, "802-11-wireless", "mac-address"))
        .filter(|mac| !mac.is_empty())
        .map(|mac| format_mac(&mac));
    connection.ssid = bytes_setting(&settings, "802-11-wireless", "ssid");
    connection.ip4_method = string_setting(&settings, "ipv4", "method");
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mac() {
        assert_eq!(format_mac(&[0xaa, 0x0b, 0, 1, 2, 0xff]), "AA:0B:00:01:02:FF");
    }

    #[test]
    fn test_optional_paths() {
        let none = OwnedObjectPath::try_from("/").unwrap();
        let some = OwnedObjectPath::try_from("/org/freedesktop/NetworkManager/Devices/3").unwrap();
        assert_eq!(optional::<DevicePath>(&none), None);
        assert_eq!(
            optional::<DevicePath>(&some),
            Some(DevicePath::from("/org/freedesktop/NetworkManager/Devices/3"))
        );
    }
}
