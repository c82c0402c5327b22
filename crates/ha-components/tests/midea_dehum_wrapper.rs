//! End-to-end tests of the dehumidifier wrapper against a fake climate
//! integration

use ha_components::midea_dehum_wrapper::{
    self, MideaDehumWrapper, TurnOnOutcome, CONF_ACTIVE_HVAC_MODES, CONF_CLIMATE_ENTITY, DOMAIN,
};
use ha_components::{
    register_humidifier_services, HomeAssistant, HumidifierEntity, HumidifierPlatform,
};
use ha_config_entries::{ConfigEntry, ConfigFlow};
use ha_core::domains::{climate, CLIMATE};
use ha_core::{Context, ServiceCall, State};
use ha_event_bus::EventBus;
use ha_registries::{DeviceRegistry, Storage};
use ha_service_registry::{ServiceError, ServiceRegistry};
use ha_state_store::StateStore;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

const CLIMATE_ID: &str = "climate.cellar_ac";
const HUMIDIFIER_ID: &str = "humidifier.cellar_ac";

/// Records every climate service call; listed services fail
#[derive(Default)]
struct FakeClimate {
    calls: Mutex<Vec<(String, Value)>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeClimate {
    fn install(hass: &HomeAssistant) -> Arc<Self> {
        let fake = Arc::new(Self::default());
        for service in [
            climate::SET_HVAC_MODE,
            climate::SET_PRESET_MODE,
            climate::SET_FAN_MODE,
            climate::SET_HUMIDITY,
            climate::TURN_ON,
            climate::TURN_OFF,
        ] {
            let fake = fake.clone();
            hass.services.register(CLIMATE, service, move |call: ServiceCall| {
                let fake = fake.clone();
                async move {
                    fake.calls
                        .lock()
                        .unwrap()
                        .push((call.service.clone(), call.service_data.clone()));
                    if fake.failing.lock().unwrap().contains(&call.service) {
                        Err(ServiceError::CallFailed(format!("{} refused", call.service)))
                    } else {
                        Ok(None)
                    }
                }
            });
        }
        fake
    }

    fn fail(&self, service: &str) {
        self.failing.lock().unwrap().insert(service.to_string());
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    fn services_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|(service, _)| service).collect()
    }
}

struct Fixture {
    _dir: TempDir,
    hass: HomeAssistant,
    climate: Arc<FakeClimate>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let hass = HomeAssistant::new(dir.path());
    register_humidifier_services(&hass.services, hass.humidifiers.clone());
    midea_dehum_wrapper::register(&hass);
    let climate = FakeClimate::install(&hass);
    Fixture {
        _dir: dir,
        hass,
        climate,
    }
}

fn set_climate(hass: &HomeAssistant, state: &str, attributes: Value) {
    let attributes: HashMap<String, Value> = serde_json::from_value(attributes).unwrap();
    hass.states
        .set(CLIMATE_ID.parse().unwrap(), state, attributes, Context::new());
}

fn humidifier(hass: &HomeAssistant) -> State {
    hass.states.get(HUMIDIFIER_ID).expect("humidifier state")
}

async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Run the config flow for the climate entity and set up the created entry
async fn add_wrapper(hass: &HomeAssistant) -> ConfigEntry {
    let flow = midea_dehum_wrapper::config_flow(hass);
    let result = flow
        .async_step_user(Some(HashMap::from([(
            CONF_CLIMATE_ENTITY.to_string(),
            json!(CLIMATE_ID),
        )])))
        .await;
    assert!(result.is_create_entry(), "flow did not create an entry: {result:?}");

    hass.config_entries
        .finish_flow(DOMAIN, result)
        .await
        .unwrap()
        .expect("entry created")
}

async fn set_mode(hass: &HomeAssistant, mode: &str) -> Result<Option<Value>, ServiceError> {
    hass.services
        .call(
            "humidifier",
            "set_mode",
            json!({"entity_id": HUMIDIFIER_ID, "mode": mode}),
            Context::new(),
            false,
        )
        .await
}

#[tokio::test]
async fn test_setup_publishes_dehumidifier_state() {
    let f = fixture();
    set_climate(
        &f.hass,
        "dry",
        json!({
            "friendly_name": "Cellar AC",
            "humidity": 50,
            "current_humidity": 63,
            "preset_modes": ["eco", "boost"],
            "preset_mode": "eco",
            "fan_modes": ["low", "high"],
            "fan_mode": "low",
        }),
    );

    let entry = add_wrapper(&f.hass).await;
    assert_eq!(entry.title, "Midea Dehumidifier (Cellar AC)");
    assert!(entry.is_loaded());

    let state = humidifier(&f.hass);
    assert_eq!(state.state, "on");
    assert_eq!(state.attribute::<String>("friendly_name").as_deref(), Some("Cellar AC"));
    assert_eq!(state.attribute::<String>("device_class").as_deref(), Some("dehumidifier"));
    assert_eq!(state.attribute::<String>("icon").as_deref(), Some("mdi:dehumidifier"));
    assert_eq!(state.attribute::<u32>("supported_features"), Some(1));
    assert_eq!(state.attribute::<f64>("humidity"), Some(50.0));
    assert_eq!(state.attribute::<f64>("current_humidity"), Some(63.0));
    assert_eq!(state.attribute::<f64>("min_humidity"), Some(30.0));
    assert_eq!(state.attribute::<f64>("max_humidity"), Some(80.0));
    assert_eq!(state.attribute::<String>("mode").as_deref(), Some("eco"));
    assert_eq!(
        state.attribute::<Vec<String>>("available_modes").unwrap(),
        vec!["eco", "boost", "---", "Fan: low", "Fan: high"]
    );

    let device = f
        .hass
        .devices
        .get_by_identifier(DOMAIN, CLIMATE_ID)
        .expect("device registered");
    assert_eq!(device.manufacturer.as_deref(), Some("Midea"));
    assert_eq!(device.model.as_deref(), Some("Dehumidifier Wrapper"));

    let wrapper = f.hass.humidifiers.get(HUMIDIFIER_ID).unwrap();
    assert_eq!(
        wrapper.unique_id(),
        Some(format!("{}_dehumidifier", entry.entry_id))
    );
}

#[tokio::test]
async fn test_flow_rejects_bad_entities_without_creating_entries() {
    let f = fixture();
    set_climate(&f.hass, "dry", json!({}));
    f.hass
        .states
        .set("sensor.cellar".parse().unwrap(), "61", HashMap::new(), Context::new());

    let flow = midea_dehum_wrapper::config_flow(&f.hass);
    for (entity_id, error) in [
        ("climate.missing", "entity_not_found"),
        ("sensor.cellar", "not_climate_entity"),
    ] {
        let result = flow
            .async_step_user(Some(HashMap::from([(
                CONF_CLIMATE_ENTITY.to_string(),
                json!(entity_id),
            )])))
            .await;
        assert_eq!(result.errors()[CONF_CLIMATE_ENTITY], error);
        assert!(f
            .hass
            .config_entries
            .finish_flow(DOMAIN, result)
            .await
            .unwrap()
            .is_none());
    }
    assert!(f.hass.config_entries.is_empty());
}

#[tokio::test]
async fn test_set_mode_routing() {
    let f = fixture();
    set_climate(&f.hass, "dry", json!({"preset_modes": ["eco"], "fan_modes": ["low"]}));
    add_wrapper(&f.hass).await;

    assert_ok!(set_mode(&f.hass, "---").await);
    assert!(f.climate.calls().is_empty());

    assert_ok!(set_mode(&f.hass, "Fan: low").await);
    assert_eq!(
        f.climate.calls(),
        vec![(
            "set_fan_mode".to_string(),
            json!({"entity_id": CLIMATE_ID, "fan_mode": "low"})
        )]
    );

    assert_ok!(set_mode(&f.hass, "eco").await);
    assert_eq!(
        f.climate.calls()[1],
        (
            "set_preset_mode".to_string(),
            json!({"entity_id": CLIMATE_ID, "preset_mode": "eco"})
        )
    );
    assert_eq!(f.climate.calls().len(), 2);
}

#[tokio::test]
async fn test_set_mode_errors_propagate() {
    let f = fixture();
    set_climate(&f.hass, "dry", json!({}));
    add_wrapper(&f.hass).await;
    f.climate.fail(climate::SET_PRESET_MODE);

    let result = set_mode(&f.hass, "boost").await;
    assert!(matches!(result, Err(ServiceError::CallFailed(_))));
}

#[tokio::test]
async fn test_on_off_follows_hvac_mode() {
    let f = fixture();
    set_climate(&f.hass, "off", json!({"hvac_mode": "dry"}));
    add_wrapper(&f.hass).await;
    assert_eq!(humidifier(&f.hass).state, "off");

    set_climate(&f.hass, "dry", json!({}));
    wait_until(|| humidifier(&f.hass).state == "on").await;
    assert_eq!(humidifier(&f.hass).state, "on");

    set_climate(&f.hass, "unavailable", json!({}));
    wait_until(|| humidifier(&f.hass).state == "unavailable").await;
    assert_eq!(humidifier(&f.hass).state, "unavailable");
}

#[tokio::test]
async fn test_active_modes_option() {
    let f = fixture();
    set_climate(&f.hass, "cool", json!({}));

    let entry = ConfigEntry::new(DOMAIN, "Cellar")
        .with_data(HashMap::from([(
            CONF_CLIMATE_ENTITY.to_string(),
            json!(CLIMATE_ID),
        )]))
        .with_options(HashMap::from([(
            CONF_ACTIVE_HVAC_MODES.to_string(),
            json!(["dry"]),
        )]));
    let entry = f.hass.config_entries.add(entry).await.unwrap();
    f.hass.config_entries.setup(&entry.entry_id).await.unwrap();

    assert_eq!(humidifier(&f.hass).state, "off");
}

#[tokio::test]
async fn test_missing_climate_entity_degrades() {
    let f = fixture();
    add_wrapper_without_flow(&f.hass).await;

    let state = humidifier(&f.hass);
    assert_eq!(state.state, "unavailable");
    assert_eq!(state.attribute::<String>("friendly_name").as_deref(), Some("Cellar Ac"));
    assert_eq!(state.attribute::<f64>("min_humidity"), Some(30.0));
    assert_eq!(state.attribute::<f64>("max_humidity"), Some(80.0));
    assert_eq!(state.attributes.get("available_modes"), Some(&Value::Null));

    let wrapper = f.hass.humidifiers.get(HUMIDIFIER_ID).unwrap();
    assert!(!wrapper.available());
    assert!(!wrapper.is_on());
    assert_eq!(wrapper.mode(), None);
    assert_eq!(wrapper.target_humidity(), None);
    assert_eq!(wrapper.available_modes(), None);
}

/// The flow refuses missing entities, so create the entry directly
async fn add_wrapper_without_flow(hass: &HomeAssistant) -> ConfigEntry {
    let entry = ConfigEntry::new(DOMAIN, "Cellar").with_data(HashMap::from([(
        CONF_CLIMATE_ENTITY.to_string(),
        json!(CLIMATE_ID),
    )]));
    let entry = hass.config_entries.add(entry).await.unwrap();
    hass.config_entries.setup(&entry.entry_id).await.unwrap();
    entry
}

#[tokio::test]
async fn test_turn_on_prefers_dry_mode() {
    let f = fixture();
    set_climate(&f.hass, "off", json!({}));
    let entry = add_wrapper(&f.hass).await;

    let wrapper = MideaDehumWrapper::new(
        &entry,
        CLIMATE_ID.to_string(),
        vec!["dry".to_string()],
        f.hass.bus.clone(),
        f.hass.states.clone(),
        f.hass.services.clone(),
    );
    let outcome = wrapper.turn_on_with_fallback(Context::new()).await.unwrap();

    assert!(matches!(outcome, TurnOnOutcome::DryMode));
    assert_eq!(
        f.climate.calls(),
        vec![(
            "set_hvac_mode".to_string(),
            json!({"entity_id": CLIMATE_ID, "hvac_mode": "dry"})
        )]
    );
}

#[tokio::test]
async fn test_turn_on_falls_back_once() {
    let f = fixture();
    set_climate(&f.hass, "off", json!({}));
    let entry = add_wrapper(&f.hass).await;
    f.climate.fail(climate::SET_HVAC_MODE);

    let wrapper = MideaDehumWrapper::new(
        &entry,
        CLIMATE_ID.to_string(),
        vec!["dry".to_string()],
        f.hass.bus.clone(),
        f.hass.states.clone(),
        f.hass.services.clone(),
    );
    let outcome = wrapper.turn_on_with_fallback(Context::new()).await.unwrap();

    let TurnOnOutcome::GenericTurnOn { dry_mode_error } = outcome else {
        panic!("expected the generic turn_on fallback");
    };
    assert!(matches!(dry_mode_error, ServiceError::CallFailed(_)));
    assert_eq!(f.climate.services_called(), vec!["set_hvac_mode", "turn_on"]);
}

#[tokio::test]
async fn test_turn_on_fallback_error_propagates() {
    let f = fixture();
    set_climate(&f.hass, "off", json!({}));
    add_wrapper(&f.hass).await;
    f.climate.fail(climate::SET_HVAC_MODE);
    f.climate.fail(climate::TURN_ON);

    let result = f
        .hass
        .services
        .call(
            "humidifier",
            "turn_on",
            json!({"entity_id": HUMIDIFIER_ID}),
            Context::new(),
            false,
        )
        .await;

    assert_err!(result);
    assert_eq!(f.climate.services_called(), vec!["set_hvac_mode", "turn_on"]);
}

#[tokio::test]
async fn test_turn_off_and_set_humidity_forward_verbatim() {
    let f = fixture();
    set_climate(&f.hass, "dry", json!({"max_humidity": 70}));
    add_wrapper(&f.hass).await;
    let target = json!({"entity_id": HUMIDIFIER_ID});

    assert_ok!(
        f.hass
            .services
            .call("humidifier", "turn_off", target, Context::new(), false)
            .await
    );
    assert_ok!(
        f.hass
            .services
            .call(
                "humidifier",
                "set_humidity",
                json!({"entity_id": HUMIDIFIER_ID, "humidity": 95}),
                Context::new(),
                false,
            )
            .await
    );

    assert_eq!(
        f.climate.calls(),
        vec![
            ("turn_off".to_string(), json!({"entity_id": CLIMATE_ID})),
            (
                "set_humidity".to_string(),
                json!({"entity_id": CLIMATE_ID, "humidity": 95})
            ),
        ]
    );
}

#[tokio::test]
async fn test_state_follows_climate_until_unload() {
    let f = fixture();
    set_climate(&f.hass, "dry", json!({"fan_mode": "low"}));
    let entry = add_wrapper(&f.hass).await;

    set_climate(&f.hass, "dry", json!({"fan_mode": "high"}));
    wait_until(|| humidifier(&f.hass).attribute::<String>("mode").as_deref() == Some("Fan: high"))
        .await;
    assert_eq!(
        humidifier(&f.hass).attribute::<String>("mode").as_deref(),
        Some("Fan: high")
    );

    f.hass.config_entries.unload(&entry.entry_id).await.unwrap();
    assert!(f.hass.humidifiers.is_empty());
    assert!(f.hass.states.get(HUMIDIFIER_ID).is_none());
    assert!(f.hass.devices.is_empty());

    // No listener left to resurrect the entity
    set_climate(&f.hass, "dry", json!({"fan_mode": "low"}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(f.hass.states.get(HUMIDIFIER_ID).is_none());

    // Reloading brings it back
    f.hass.config_entries.setup(&entry.entry_id).await.unwrap();
    assert_eq!(
        humidifier(&f.hass).attribute::<String>("mode").as_deref(),
        Some("Fan: low")
    );
}

#[tokio::test]
async fn test_second_entry_for_same_climate_gets_own_entity() {
    let f = fixture();
    set_climate(&f.hass, "dry", json!({}));
    let first = add_wrapper(&f.hass).await;
    let second = add_wrapper(&f.hass).await;

    assert_ne!(first.entry_id, second.entry_id);
    assert_eq!(f.hass.humidifiers.len(), 2);
    assert!(f.hass.states.contains(HUMIDIFIER_ID));
    assert!(f.hass.states.contains("humidifier.cellar_ac_2"));
    assert_eq!(f.hass.devices.len(), 1);
}

#[tokio::test]
async fn test_unload_during_command_leaves_no_state() {
    let f = fixture();
    set_climate(&f.hass, "dry", json!({}));
    let entry = add_wrapper(&f.hass).await;

    // climate.turn_off blocks until released
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (started, gate) = (entered.clone(), release.clone());
    f.hass.services.register(CLIMATE, climate::TURN_OFF, move |_: ServiceCall| {
        let (started, gate) = (started.clone(), gate.clone());
        async move {
            started.notify_one();
            gate.notified().await;
            Ok(None)
        }
    });

    let services = f.hass.services.clone();
    let command = tokio::spawn(async move {
        services
            .call(
                "humidifier",
                "turn_off",
                json!({"entity_id": HUMIDIFIER_ID}),
                Context::new(),
                false,
            )
            .await
    });
    entered.notified().await;

    f.hass.config_entries.unload(&entry.entry_id).await.unwrap();
    assert!(f.hass.states.get(HUMIDIFIER_ID).is_none());

    release.notify_one();
    assert_ok!(command.await.unwrap());
    assert!(f.hass.states.get(HUMIDIFIER_ID).is_none());
}

#[tokio::test]
async fn test_missed_climate_changes_still_refresh() {
    let dir = TempDir::new().unwrap();
    let bus = Arc::new(EventBus::with_capacity(2));
    let states = Arc::new(StateStore::new(bus.clone()));
    let devices = Arc::new(DeviceRegistry::new(Arc::new(Storage::new(dir.path()))));
    let platform = HumidifierPlatform::new(states.clone(), devices);
    set_states(&states, CLIMATE_ID, "off");

    let entry = ConfigEntry::new(DOMAIN, "Cellar");
    let wrapper = MideaDehumWrapper::new(
        &entry,
        CLIMATE_ID.to_string(),
        vec!["dry".to_string()],
        bus,
        states.clone(),
        Arc::new(ServiceRegistry::new()),
    );
    platform.add_entities(&entry.entry_id, vec![Arc::new(wrapper) as Arc<dyn HumidifierEntity>]);
    assert_eq!(states.get_state(HUMIDIFIER_ID).as_deref(), Some("off"));

    // flood the small channel before the listener gets to run
    set_states(&states, CLIMATE_ID, "dry");
    for i in 0..4 {
        set_states(&states, &format!("sensor.cellar_{i}"), "1");
    }

    wait_until(|| states.get_state(HUMIDIFIER_ID).as_deref() == Some("on")).await;
    assert_eq!(states.get_state(HUMIDIFIER_ID).as_deref(), Some("on"));
}

fn set_states(states: &StateStore, entity_id: &str, state: &str) {
    states.set(entity_id.parse().unwrap(), state, HashMap::new(), Context::new());
}

#[tokio::test]
async fn test_entries_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let hass = HomeAssistant::new(dir.path());
        midea_dehum_wrapper::register(&hass);
        set_climate(&hass, "dry", json!({"friendly_name": "Cellar AC"}));
        add_wrapper(&hass).await;
        hass.save().await.unwrap();
    }

    let hass = HomeAssistant::new(dir.path());
    midea_dehum_wrapper::register(&hass);
    hass.load().await.unwrap();
    set_climate(&hass, "dry", json!({"friendly_name": "Cellar AC"}));

    assert_eq!(hass.config_entries.get_by_domain(DOMAIN).len(), 1);
    assert!(hass.config_entries.setup_all().await.iter().all(|r| r.is_ok()));
    assert_eq!(hass.states.get_state(HUMIDIFIER_ID).as_deref(), Some("on"));
    assert_eq!(hass.devices.len(), 1);
}
