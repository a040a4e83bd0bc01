//! JSON codec for effect racks.
//!
//! ```json
//! { "name": "pluck",
//!   "effects": [
//!     { "id": 0, "toDelete": false, "enabled": true,
//!       "value": { "type": 0, "waveform": 0, "amplitude": { "value": 1 },
//!                  "frequency": { "regIdx": 0 }, ... } } ] }
//! ```
//!
//! Node `type`, `waveform` and switch `operator` are stable integers.
//! Register indices are never written; they are regenerated on compile.
//! Fields missing from a payload take the node constructor's value, so
//! racks saved before a parameter existed still load.

use serde::de::DeserializeOwned;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::compiler::compile;
use crate::error::RackError;
use crate::rack::{
    Biquad, Delay, EffectKind, EffectNode, EffectRack, Envelope, Maths, NodeType, Noise, Oscillator,
    Switch,
};

/// Compile `rack`, then encode it.
///
/// Compiling first means the output reflects deletions and demoted
/// references rather than whatever state the editor left behind.
pub fn serialize(rack: &mut EffectRack) -> Result<String, RackError> {
    compile(rack);
    Ok(serde_json::to_string(rack)?)
}

/// Decode a rack. The result is not compiled.
pub fn deserialize(json: &str) -> Result<EffectRack, RackError> {
    let root: Value = serde_json::from_str(json)?;
    let obj = root.as_object().ok_or(RackError::NotAnObject { what: "rack" })?;

    let mut rack = EffectRack::new();
    if let Some(name) = field::<String>(obj, "name")? {
        rack.name = name;
    }

    let effects = obj
        .get("effects")
        .and_then(Value::as_array)
        .ok_or(RackError::MissingField { field: "effects" })?;
    rack.effects = effects.iter().map(node_from_value).collect::<Result<_, _>>()?;

    Ok(rack)
}

/// Decode and compile, ready to step.
pub fn load(json: &str) -> Result<EffectRack, RackError> {
    let mut rack = deserialize(json)?;
    compile(&mut rack);
    Ok(rack)
}

fn field<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str) -> Result<Option<T>, RackError> {
    match obj.get(key) {
        Some(v) => Ok(Some(T::deserialize(v)?)),
        None => Ok(None),
    }
}

fn node_from_value(value: &Value) -> Result<EffectNode, RackError> {
    let obj = value.as_object().ok_or(RackError::NotAnObject { what: "effect" })?;
    let body = obj.get("value").ok_or(RackError::MissingField { field: "value" })?;

    let mut node = EffectNode::new(kind_from_value(body)?);
    // Negative or oversized IDs are placeholders for "not yet assigned".
    node.id = field::<Option<i64>>(obj, "id")?
        .flatten()
        .and_then(|id| u32::try_from(id).ok());
    node.to_delete = field(obj, "toDelete")?.unwrap_or(false);
    node.enabled = field(obj, "enabled")?.unwrap_or(true);
    Ok(node)
}

fn kind_from_value(body: &Value) -> Result<EffectKind, RackError> {
    if !body.is_object() {
        return Err(RackError::NotAnObject { what: "effect value" });
    }
    let tag = body.get("type").ok_or(RackError::MissingField { field: "type" })?;
    let node_type = tag
        .as_u64()
        .and_then(NodeType::from_tag)
        .ok_or_else(|| RackError::UnknownNodeType(tag.to_string()))?;

    Ok(match node_type {
        NodeType::Oscillator => Oscillator::deserialize(body)?.into(),
        NodeType::Envelope => Envelope::deserialize(body)?.into(),
        NodeType::Maths => Maths::deserialize(body)?.into(),
        NodeType::Switch => Switch::deserialize(body)?.into(),
        NodeType::Noise => Noise::deserialize(body)?.into(),
        NodeType::Delay => Delay::deserialize(body)?.into(),
        NodeType::Biquad => Biquad::deserialize(body)?.into(),
    })
}

impl Serialize for EffectKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            EffectKind::Oscillator(v) => serde_json::to_value(v),
            EffectKind::Envelope(v) => serde_json::to_value(v),
            EffectKind::Maths(v) => serde_json::to_value(v),
            EffectKind::Switch(v) => serde_json::to_value(v),
            EffectKind::Noise(v) => serde_json::to_value(v),
            EffectKind::Delay(v) => serde_json::to_value(v),
            EffectKind::Biquad(v) => serde_json::to_value(v),
        }
        .map_err(S::Error::custom)?;

        let Value::Object(mut map) = body else {
            return Err(S::Error::custom("effect node did not serialize to an object"));
        };
        map.insert("type".to_string(), self.node_type().tag().into());
        map.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rack::{Binding, Builtin, Condition, Param, SwitchOp, Term, Waveform};

    /// One of every node, with a mix of binding kinds.
    fn showcase() -> EffectRack {
        let mut rack = EffectRack::new();
        rack.name = "showcase".to_string();

        let mut osc = Oscillator::new();
        osc.waveform = Waveform::Triangle;
        osc.frequency_mult = Param::constant(2.0);
        rack.push(osc);

        let mut env = Envelope::new();
        env.to_modulate = Param::effect(0);
        rack.push(env);

        let mut maths = Maths::new();
        maths.terms = vec![Term::new(), Term::of([Param::effect(1), Param::constant(0.5)]), Term::of([])];
        rack.push(maths);

        let mut switch = Switch::new();
        switch.conditions.push(Condition {
            a: Param::builtin(Builtin::SignalRaw),
            operator: SwitchOp::GreaterThan,
            b: Param::constant(0.5),
            then: Param::effect(2),
        });
        rack.push(switch);

        rack.push(Noise::new()).enabled = false;

        let mut delay = Delay::new();
        delay.signal = Param::effect(3);
        delay.seconds = Param::constant(0.25);
        rack.push(delay);

        let mut biquad = Biquad::new();
        biquad.signal = Param::effect(5);
        biquad.b1 = Param::default();
        rack.push(biquad);

        rack
    }

    #[test]
    fn new_rack_round_trips() {
        let mut rack = EffectRack::new();
        let json = serialize(&mut rack).unwrap();
        let back = deserialize(&json).unwrap();
        assert_eq!(back.name, EffectRack::new().name);
        assert_eq!(back.effects, EffectRack::new().effects);
    }

    #[test]
    fn every_node_type_round_trips() {
        let mut rack = showcase();
        let json = serialize(&mut rack).unwrap();

        let mut back = deserialize(&json).unwrap();
        assert!(!back.is_compiled());
        compile(&mut back);

        assert_eq!(back.name, rack.name);
        assert_eq!(back.effects, rack.effects);
        assert_eq!(back.template().values(), rack.template().values());
        assert_eq!(back.template().persisted(), rack.template().persisted());
        assert_eq!(back.template().buffer_seconds(), rack.template().buffer_seconds());
    }

    #[test]
    fn uncompiled_decode_matches_fresh_constructors() {
        let mut rack = showcase();
        let json = serialize(&mut rack).unwrap();
        let back = deserialize(&json).unwrap();

        let mut expected = showcase();
        for (i, e) in expected.effects.iter_mut().enumerate() {
            e.id = Some(i as u32);
        }
        assert_eq!(back.effects, expected.effects);
    }

    #[test]
    fn serialize_is_deterministic() {
        let mut a = showcase();
        let mut b = showcase();
        assert_eq!(serialize(&mut a).unwrap(), serialize(&mut b).unwrap());
        let again = serialize(&mut a).unwrap();
        assert_eq!(again, serialize(&mut b).unwrap());
    }

    #[test]
    fn private_fields_not_on_the_wire() {
        let mut rack = showcase();
        let json = serialize(&mut rack).unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        let first = &v["effects"][0];
        assert!(first.get("dst").is_none());
        assert!(first["value"].get("t").is_none());
        assert_eq!(first["value"]["type"], 0);
        assert_eq!(first["value"]["waveform"], 3);
        assert_eq!(first["value"]["frequency"], serde_json::json!({ "regIdx": 0 }));
        assert_eq!(first["toDelete"], false);
        assert!(v.get("positions").is_none());
        assert!(v.get("template").is_none());
    }

    #[test]
    fn serialize_applies_pending_deletes() {
        let mut rack = showcase();
        compile(&mut rack);
        rack.mark_deleted(0);
        let json = serialize(&mut rack).unwrap();
        let back = deserialize(&json).unwrap();
        assert_eq!(back.effects.len(), 6);
        let EffectKind::Envelope(e) = &back.effects[0].value else { panic!("expected envelope") };
        assert_eq!(e.to_modulate.binding, Binding::Constant(Envelope::TO_MODULATE_DEFAULT));
    }

    #[test]
    fn missing_fields_are_backfilled() {
        let json = r#"{ "effects": [
            { "value": { "type": 0, "amplitude": { "value": 0.5 } } },
            { "id": 1, "value": { "type": 1 } }
        ] }"#;
        let rack = deserialize(json).unwrap();
        assert_eq!(rack.name, "");

        let EffectKind::Oscillator(o) = &rack.effects[0].value else { panic!("expected oscillator") };
        assert_eq!(o.amplitude.binding, Binding::Constant(0.5));
        assert_eq!(o.frequency, Oscillator::new().frequency);
        assert_eq!(o.waveform, Waveform::Sine);
        assert_eq!(rack.effects[0].id, None);
        assert!(rack.effects[0].enabled);

        assert_eq!(rack.effects[1].value, EffectKind::Envelope(Envelope::new()));
        assert_eq!(rack.effects[1].id, Some(1));
    }

    #[test]
    fn sentinel_ids_load_unassigned() {
        let json = r#"{ "effects": [
            { "id": 0, "value": { "type": 4 } },
            { "id": -1, "value": { "type": 4 } },
            { "id": 4294967296, "value": { "type": 4 } },
            { "id": null, "value": { "type": 4 } }
        ] }"#;
        let rack = deserialize(json).unwrap();
        let ids: Vec<_> = rack.effects.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![Some(0), None, None, None]);

        let loaded = load(json).unwrap();
        assert_eq!(loaded.info().node_ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn unknown_node_type_is_an_error() {
        let err = deserialize(r#"{ "effects": [ { "value": { "type": 7 } } ] }"#).unwrap_err();
        assert!(matches!(err, RackError::UnknownNodeType(ref t) if t == "7"), "got {err}");
        let err = deserialize(r#"{ "effects": [ { "value": { "type": "osc" } } ] }"#).unwrap_err();
        assert!(matches!(err, RackError::UnknownNodeType(_)));
    }

    #[test]
    fn unknown_waveform_is_an_error() {
        let err = deserialize(r#"{ "effects": [ { "value": { "type": 0, "waveform": 9 } } ] }"#).unwrap_err();
        assert!(matches!(err, RackError::Json(_)));
        assert!(err.to_string().contains("waveform"), "got {err}");
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let json = r#"{ "effects": [ { "value": { "type": 3, "conditions": [ { "operator": 3 } ] } } ] }"#;
        assert!(matches!(deserialize(json), Err(RackError::Json(_))));
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(deserialize("{"), Err(RackError::Json(_))));
        assert!(matches!(deserialize("[]"), Err(RackError::NotAnObject { what: "rack" })));
        assert!(matches!(deserialize("{}"), Err(RackError::MissingField { field: "effects" })));
        assert!(matches!(
            deserialize(r#"{ "effects": [1] }"#),
            Err(RackError::NotAnObject { what: "effect" })
        ));
        assert!(matches!(
            deserialize(r#"{ "effects": [ {} ] }"#),
            Err(RackError::MissingField { field: "value" })
        ));
        assert!(matches!(
            deserialize(r#"{ "effects": [ { "value": {} } ] }"#),
            Err(RackError::MissingField { field: "type" })
        ));
    }

    #[test]
    fn load_compiles() {
        let mut rack = showcase();
        let json = serialize(&mut rack).unwrap();
        let loaded = load(&json).unwrap();
        assert!(loaded.is_compiled());
        assert_eq!(loaded.info().node_ids, (0..7).collect::<Vec<_>>());
    }
}
