#![allow(dead_code)]

use atomstore::{
    Atom, AtomMeta, DslValue, Field, IndexField, SumType, UnionField, Value, ValueType, Variant,
    Workspace, WorkspaceConfig,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl DslValue for Color {
    const VALUE_TYPE: ValueType = ValueType::Integer;

    fn into_value(self) -> Value {
        Value::Integer(self as i64)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(0) => Some(Color::Red),
            Value::Integer(1) => Some(Color::Green),
            Value::Integer(2) => Some(Color::Blue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub damage: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orb {
    pub name: String,
    pub power: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Equipment {
    Weapon(Weapon),
    Orb(Orb),
}

impl SumType for Equipment {
    type Tag = i32;

    fn tag(&self) -> i32 {
        match self {
            Equipment::Weapon(_) => 1,
            Equipment::Orb(_) => 2,
        }
    }
}

impl Variant<Equipment> for Weapon {
    const NAME: &'static str = "Weapon";

    fn narrow(sum: &Equipment) -> Option<&Self> {
        match sum {
            Equipment::Weapon(weapon) => Some(weapon),
            _ => None,
        }
    }
}

impl Variant<Equipment> for Orb {
    const NAME: &'static str = "Orb";

    fn narrow(sum: &Equipment) -> Option<&Self> {
        match sum {
            Equipment::Orb(orb) => Some(orb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monster {
    #[serde(skip)]
    pub meta: AtomMeta,
    pub name: String,
    pub mana: i32,
    pub hp: i32,
    pub color: Color,
    pub equipped: Option<Equipment>,
}

impl Monster {
    pub fn new(name: &str, mana: i32, hp: i32) -> Self {
        Self {
            meta: AtomMeta::default(),
            name: name.to_string(),
            mana,
            hp,
            color: Color::Red,
            equipped: None,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_equipment(mut self, equipment: Equipment) -> Self {
        self.equipped = Some(equipment);
        self
    }

    pub fn name_field() -> Field<Monster, String> {
        Field::new("name", |m: &Monster| m.name.clone())
    }

    pub fn mana() -> Field<Monster, i32> {
        Field::new("mana", |m: &Monster| m.mana).with_direct_extraction()
    }

    pub fn hp() -> Field<Monster, i32> {
        Field::new("hp", |m: &Monster| m.hp)
    }

    pub fn color() -> Field<Monster, Color> {
        Field::new("color", |m: &Monster| m.color)
    }

    pub fn equipped() -> UnionField<Monster, Equipment> {
        UnionField::new("equipped", |m: &Monster| m.equipped.as_ref())
    }

    pub fn orb_name() -> Field<Monster, String> {
        Self::equipped()
            .narrow::<Orb>()
            .field("name", |orb: &Orb| orb.name.clone())
    }

    pub fn weapon_damage() -> Field<Monster, i32> {
        Self::equipped()
            .narrow::<Weapon>()
            .field("damage", |weapon: &Weapon| weapon.damage)
    }
}

impl Atom for Monster {
    const TABLE: &'static str = "monster";

    fn indexes() -> Vec<IndexField<Self>> {
        vec![
            IndexField::new(Monster::mana()),
            IndexField::new(Monster::hp()),
            IndexField::new(Monster::color()),
            IndexField::new(Monster::equipped().tag()),
            IndexField::new(Monster::orb_name()).unique(),
            IndexField::new(Monster::weapon_damage()),
        ]
    }

    fn primary_key_columns() -> &'static [ValueType] {
        &[ValueType::Text]
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::Text(self.name.as_str().into())]
    }

    fn meta(&self) -> &AtomMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut AtomMeta {
        &mut self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trader {
    #[serde(skip)]
    pub meta: AtomMeta,
    pub name: String,
    pub gold: i64,
}

impl Trader {
    pub fn new(name: &str, gold: i64) -> Self {
        Self {
            meta: AtomMeta::default(),
            name: name.to_string(),
            gold,
        }
    }

    pub fn gold() -> Field<Trader, i64> {
        Field::new("gold", |t: &Trader| t.gold)
    }
}

impl Atom for Trader {
    const TABLE: &'static str = "trader";

    fn indexes() -> Vec<IndexField<Self>> {
        vec![IndexField::new(Trader::gold())]
    }

    fn primary_key_columns() -> &'static [ValueType] {
        &[ValueType::Text]
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::Text(self.name.as_str().into())]
    }

    fn meta(&self) -> &AtomMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut AtomMeta {
        &mut self.meta
    }
}

/// An atom with an indexed float, for values SQLite cannot store as REAL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Racer {
    #[serde(skip)]
    pub meta: AtomMeta,
    pub name: String,
    pub speed: f64,
}

impl Racer {
    pub fn new(name: &str, speed: f64) -> Self {
        Self {
            meta: AtomMeta::default(),
            name: name.to_string(),
            speed,
        }
    }

    pub fn speed() -> Field<Racer, f64> {
        Field::new("speed", |r: &Racer| r.speed).with_direct_extraction()
    }
}

impl Atom for Racer {
    const TABLE: &'static str = "racer";

    fn indexes() -> Vec<IndexField<Self>> {
        vec![IndexField::new(Racer::speed())]
    }

    fn primary_key_columns() -> &'static [ValueType] {
        &[ValueType::Text]
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::Text(self.name.as_str().into())]
    }

    fn meta(&self) -> &AtomMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut AtomMeta {
        &mut self.meta
    }
}

pub fn open(dir: &Path) -> Workspace {
    Workspace::open_with_config(dir.join("atoms.db"), WorkspaceConfig::development())
        .expect("open workspace")
}

/// A second connection straight to the database file, for simulating schema
/// drift behind the workspace's back.
pub fn raw(dir: &Path) -> rusqlite::Connection {
    let conn = rusqlite::Connection::open(dir.join("atoms.db")).expect("raw connection");
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .expect("busy timeout");
    conn
}

pub fn insert_all<E: Atom>(workspace: &Workspace, atoms: Vec<E>) -> Vec<E> {
    workspace
        .perform_changes(|txn| {
            let mut stored = Vec::new();
            for atom in atoms.clone() {
                let mut request = atomstore::ChangeRequest::creation(atom);
                match txn.submit(&mut request)? {
                    atomstore::UpdatedObject::Inserted(atom) => stored.push(atom),
                    _ => panic!("creation did not insert"),
                }
            }
            Ok(stored)
        })
        .expect("insert atoms")
}

pub fn names(monsters: &[Monster]) -> Vec<String> {
    monsters.iter().map(|m| m.name.clone()).collect()
}
