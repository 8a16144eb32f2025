//! Values returned in records and accepted as statement parameters.
//!
//! Graph entities, points and temporal values travel as PackStream
//! structures; everything else maps one to one onto a PackStream scalar or
//! collection.

use std::collections::HashMap;
use std::fmt;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};
use serde::{Deserialize, Serialize};

use super::error::{DriverError, DriverResult};
use crate::bolt::error::{BoltError, BoltResult};
use crate::bolt::packstream::marker::tag;
use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

// ============================================================================
// Value
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Node(Node),
    Relationship(Relationship),
    Path(Path),
    Point(Point),
    Date(NaiveDate),
    /// Time of day with a UTC offset
    Time(OffsetTime),
    LocalTime(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    /// Local date-time in a named zone, such as `Europe/Stockholm`
    DateTimeZoneId(ZonedDateTime),
    LocalDateTime(NaiveDateTime),
    Duration(Duration),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Value::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Node(_) => "Node",
            Value::Relationship(_) => "Relationship",
            Value::Path(_) => "Path",
            Value::Point(_) => "Point",
            Value::Date(_) => "Date",
            Value::Time(_) => "Time",
            Value::LocalTime(_) => "LocalTime",
            Value::DateTime(_) => "DateTime",
            Value::DateTimeZoneId(_) => "DateTimeZoneId",
            Value::LocalDateTime(_) => "LocalDateTime",
            Value::Duration(_) => "Duration",
        }
    }

    /// Encode as a statement parameter.
    ///
    /// Graph entities only ever come back from the server; sending one is an
    /// [`BoltError::Encode`].
    pub fn to_packstream(&self) -> BoltResult<PackStreamValue> {
        let structure = |tag: u8, fields: Vec<PackStreamValue>| {
            PackStreamValue::Structure(PackStreamStructure::new(tag, fields))
        };
        let value = match self {
            Value::Null => PackStreamValue::Null,
            Value::Boolean(b) => PackStreamValue::Boolean(*b),
            Value::Integer(i) => PackStreamValue::Integer(*i),
            Value::Float(f) => PackStreamValue::Float(*f),
            Value::String(s) => PackStreamValue::String(s.clone()),
            Value::Bytes(b) => PackStreamValue::Bytes(b.clone()),
            Value::List(l) => PackStreamValue::List(
                l.iter().map(Value::to_packstream).collect::<BoltResult<_>>()?,
            ),
            Value::Map(m) => PackStreamValue::Map(
                m.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_packstream()?)))
                    .collect::<BoltResult<_>>()?,
            ),
            Value::Node(_) | Value::Relationship(_) | Value::Path(_) => {
                return Err(BoltError::Encode(format!(
                    "{} values cannot be sent as parameters",
                    self.type_name()
                )))
            }
            Value::Point(p) => match p.z {
                Some(z) => structure(
                    tag::POINT_3D,
                    vec![p.srid.into(), p.x.into(), p.y.into(), z.into()],
                ),
                None => structure(tag::POINT_2D, vec![p.srid.into(), p.x.into(), p.y.into()]),
            },
            Value::Date(d) => structure(
                tag::DATE,
                vec![(d.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE).into()],
            ),
            Value::Time(t) => structure(
                tag::TIME,
                vec![nanos_of_day(&t.time).into(), t.offset_seconds.into()],
            ),
            Value::LocalTime(t) => structure(tag::LOCAL_TIME, vec![nanos_of_day(t).into()]),
            Value::DateTime(dt) => {
                let offset = dt.offset().local_minus_utc();
                structure(
                    tag::DATE_TIME,
                    vec![
                        (dt.timestamp() + offset as i64).into(),
                        (dt.timestamp_subsec_nanos() as i64).into(),
                        offset.into(),
                    ],
                )
            }
            Value::DateTimeZoneId(z) => {
                let (seconds, nanos) = local_epoch(&z.datetime);
                structure(
                    tag::DATE_TIME_ZONE_ID,
                    vec![seconds.into(), nanos.into(), z.zone_id.as_str().into()],
                )
            }
            Value::LocalDateTime(dt) => {
                let (seconds, nanos) = local_epoch(dt);
                structure(tag::LOCAL_DATE_TIME, vec![seconds.into(), nanos.into()])
            }
            Value::Duration(d) => structure(
                tag::DURATION,
                vec![
                    d.months.into(),
                    d.days.into(),
                    d.seconds.into(),
                    d.nanoseconds.into(),
                ],
            ),
        };
        Ok(value)
    }
}

fn nanos_of_day(time: &NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * NANOS_PER_SECOND + time.nanosecond() as i64
}

fn local_epoch(datetime: &NaiveDateTime) -> (i64, i64) {
    let utc = datetime.and_utc();
    (utc.timestamp(), utc.timestamp_subsec_nanos() as i64)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(l) => write!(f, "[{} items]", l.len()),
            Value::Map(m) => write!(f, "{{{} entries}}", m.len()),
            Value::Node(n) => write!(f, "{}", n),
            Value::Relationship(r) => write!(f, "{}", r),
            Value::Path(p) => write!(f, "{}", p),
            Value::Point(p) => write!(f, "{}", p),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::LocalTime(t) => write!(f, "{}", t),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::DateTimeZoneId(z) => write!(f, "{}", z),
            Value::LocalDateTime(dt) => write!(f, "{}", dt),
            Value::Duration(d) => write!(f, "{}", d),
        }
    }
}

macro_rules! value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    i64 => Integer,
    i32 => Integer,
    f64 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    HashMap<String, Value> => Map,
    Point => Point,
    NaiveDate => Date,
    OffsetTime => Time,
    NaiveTime => LocalTime,
    DateTime<FixedOffset> => DateTime,
    ZonedDateTime => DateTimeZoneId,
    NaiveDateTime => LocalDateTime,
    Duration => Duration,
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

// ============================================================================
// Graph entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, Value>,
}

impl Node {
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, Value>) -> Self {
        Self { id, labels, properties }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Property converted to `T`. A missing property is a conversion error.
    pub fn get_as<T: TryFrom<Value, Error = DriverError>>(&self, key: &str) -> DriverResult<T> {
        self.properties
            .get(key)
            .cloned()
            .ok_or_else(|| DriverError::type_conversion(format!("Property '{}' not found", key)))
            .and_then(T::try_from)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.id)?;
        for label in &self.labels {
            write!(f, ":{}", label)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

impl Relationship {
    pub fn new(
        id: i64,
        start_node_id: i64,
        end_node_id: i64,
        rel_type: impl Into<String>,
        properties: HashMap<String, Value>,
    ) -> Self {
        Self {
            id,
            start_node_id,
            end_node_id,
            rel_type: rel_type.into(),
            properties,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-[{}:{}]->({})",
            self.start_node_id, self.id, self.rel_type, self.end_node_id
        )
    }
}

/// An alternating walk: `nodes[i]` and `nodes[i + 1]` are joined by
/// `relationships[i]`, whose direction may run either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl Path {
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Self {
        Self { nodes, relationships }
    }

    /// Number of relationships.
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn start(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&Node> {
        self.nodes.last()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Path: {} nodes, {} rels>", self.nodes.len(), self.relationships.len())
    }
}

// ============================================================================
// Spatial and temporal values
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub srid: i64,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Point {
    pub fn new_2d(srid: i64, x: f64, y: f64) -> Self {
        Self { srid, x, y, z: None }
    }

    pub fn new_3d(srid: i64, x: f64, y: f64, z: f64) -> Self {
        Self { srid, x, y, z: Some(z) }
    }

    pub fn wgs84_2d(longitude: f64, latitude: f64) -> Self {
        Self::new_2d(4326, longitude, latitude)
    }

    pub fn cartesian_2d(x: f64, y: f64) -> Self {
        Self::new_2d(7203, x, y)
    }

    pub fn is_3d(&self) -> bool {
        self.z.is_some()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.z {
            Some(z) => write!(f, "Point(srid={}, x={}, y={}, z={})", self.srid, self.x, self.y, z),
            None => write!(f, "Point(srid={}, x={}, y={})", self.srid, self.x, self.y),
        }
    }
}

/// Time of day carrying its own UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetTime {
    pub time: NaiveTime,
    pub offset_seconds: i32,
}

impl fmt::Display for OffsetTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match FixedOffset::east_opt(self.offset_seconds) {
            Some(offset) => write!(f, "{}{}", self.time, offset),
            None => write!(f, "{}{:+}s", self.time, self.offset_seconds),
        }
    }
}

/// Wall-clock date-time in a named time zone.
///
/// Zone rules are not resolved locally, so the value keeps the local time
/// and the zone name exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZonedDateTime {
    pub datetime: NaiveDateTime,
    pub zone_id: String,
}

impl fmt::Display for ZonedDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.datetime, self.zone_id)
    }
}

/// Calendar-aware duration: months and days are not normalised into seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanoseconds: i64,
}

impl Duration {
    pub fn new(months: i64, days: i64, seconds: i64, nanoseconds: i64) -> Self {
        Self {
            months,
            days,
            seconds,
            nanoseconds,
        }
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self::new(0, 0, seconds, 0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{}M{}DT{}S",
            self.months,
            self.days,
            self.seconds as f64 + self.nanoseconds as f64 / NANOS_PER_SECOND as f64
        )
    }
}

// ============================================================================
// Decoding from PackStream
// ============================================================================

/// Positional reader over a structure's fields.
struct Fields {
    name: &'static str,
    fields: std::vec::IntoIter<PackStreamValue>,
}

impl Fields {
    fn open(s: PackStreamStructure, name: &'static str, arity: usize) -> DriverResult<Self> {
        if s.fields.len() != arity {
            return Err(DriverError::protocol(format!(
                "{} structure needs {} fields, got {}",
                name,
                arity,
                s.fields.len()
            )));
        }
        Ok(Self {
            name,
            fields: s.fields.into_iter(),
        })
    }

    fn next(&mut self) -> DriverResult<PackStreamValue> {
        self.fields
            .next()
            .ok_or_else(|| DriverError::protocol(format!("{} structure is short a field", self.name)))
    }

    fn mismatch(&self, expected: &str, got: &PackStreamValue) -> DriverError {
        DriverError::protocol(format!(
            "{} field should be {}, got {}",
            self.name,
            expected,
            got.type_name()
        ))
    }

    fn int(&mut self) -> DriverResult<i64> {
        match self.next()? {
            PackStreamValue::Integer(i) => Ok(i),
            other => Err(self.mismatch("Integer", &other)),
        }
    }

    fn float(&mut self) -> DriverResult<f64> {
        match self.next()? {
            PackStreamValue::Float(f) => Ok(f),
            other => Err(self.mismatch("Float", &other)),
        }
    }

    fn string(&mut self) -> DriverResult<String> {
        match self.next()? {
            PackStreamValue::String(s) => Ok(s),
            other => Err(self.mismatch("String", &other)),
        }
    }

    fn list(&mut self) -> DriverResult<Vec<PackStreamValue>> {
        match self.next()? {
            PackStreamValue::List(l) => Ok(l),
            other => Err(self.mismatch("List", &other)),
        }
    }

    fn properties(&mut self) -> DriverResult<HashMap<String, Value>> {
        match self.next()? {
            PackStreamValue::Map(m) => convert_map(m),
            other => Err(self.mismatch("Map", &other)),
        }
    }
}

fn convert_map(map: HashMap<String, PackStreamValue>) -> DriverResult<HashMap<String, Value>> {
    map.into_iter()
        .map(|(k, v)| Ok((k, Value::try_from(v)?)))
        .collect()
}

fn out_of_range(what: &str) -> DriverError {
    DriverError::protocol(format!("{} out of range", what))
}

fn time_of_day(nanos: i64) -> DriverResult<NaiveTime> {
    let seconds = u32::try_from(nanos.div_euclid(NANOS_PER_SECOND)).map_err(|_| out_of_range("time"))?;
    let sub = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, sub).ok_or_else(|| out_of_range("time"))
}

fn naive_from_epoch(seconds: i64, nanos: i64) -> DriverResult<NaiveDateTime> {
    let nanos = u32::try_from(nanos).map_err(|_| out_of_range("nanoseconds"))?;
    DateTime::from_timestamp(seconds, nanos)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| out_of_range("date-time"))
}

fn node_from(s: PackStreamStructure) -> DriverResult<Node> {
    let mut f = Fields::open(s, "Node", 3)?;
    let id = f.int()?;
    let labels = f
        .list()?
        .into_iter()
        .map(|label| match label {
            PackStreamValue::String(s) => Ok(s),
            other => Err(DriverError::protocol(format!(
                "Node label should be String, got {}",
                other.type_name()
            ))),
        })
        .collect::<DriverResult<_>>()?;
    Ok(Node::new(id, labels, f.properties()?))
}

/// A relationship inside a path, before its endpoints are known.
struct UnboundRelationship {
    id: i64,
    rel_type: String,
    properties: HashMap<String, Value>,
}

fn unbound_from(value: PackStreamValue) -> DriverResult<UnboundRelationship> {
    match value {
        PackStreamValue::Structure(s) if s.tag == tag::UNBOUND_RELATIONSHIP => {
            let mut f = Fields::open(s, "UnboundRelationship", 3)?;
            Ok(UnboundRelationship {
                id: f.int()?,
                rel_type: f.string()?,
                properties: f.properties()?,
            })
        }
        other => Err(DriverError::protocol(format!(
            "Path relationship should be UnboundRelationship, got {}",
            other.type_name()
        ))),
    }
}

/// Rebuild a path from its distinct nodes, distinct relationships and the
/// index sequence `[rel, node, rel, node, ...]`. Relationship indices are
/// 1-based; a negative index walks the relationship backwards.
fn path_from(s: PackStreamStructure) -> DriverResult<Path> {
    let mut f = Fields::open(s, "Path", 3)?;
    let nodes = f
        .list()?
        .into_iter()
        .map(|v| match v {
            PackStreamValue::Structure(s) if s.tag == tag::NODE => node_from(s),
            other => Err(DriverError::protocol(format!(
                "Path node should be Node, got {}",
                other.type_name()
            ))),
        })
        .collect::<DriverResult<Vec<_>>>()?;
    let rels = f
        .list()?
        .into_iter()
        .map(unbound_from)
        .collect::<DriverResult<Vec<_>>>()?;
    let indices = f
        .list()?
        .into_iter()
        .map(|v| v.as_int().ok_or_else(|| DriverError::protocol("Path index should be Integer")))
        .collect::<DriverResult<Vec<_>>>()?;

    if indices.len() % 2 != 0 {
        return Err(DriverError::protocol("Path index sequence has odd length"));
    }
    let mut current = nodes
        .first()
        .ok_or_else(|| DriverError::protocol("Path without nodes"))?;
    let mut walk = vec![current.clone()];
    let mut relationships = Vec::with_capacity(indices.len() / 2);
    for pair in indices.chunks_exact(2) {
        let (rel_index, node_index) = (pair[0], pair[1]);
        let rel = usize::try_from(rel_index.unsigned_abs())
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| rels.get(i))
            .ok_or_else(|| out_of_range("Path relationship index"))?;
        let next = usize::try_from(node_index)
            .ok()
            .and_then(|i| nodes.get(i))
            .ok_or_else(|| out_of_range("Path node index"))?;
        let (start, end) = if rel_index > 0 {
            (current.id, next.id)
        } else {
            (next.id, current.id)
        };
        relationships.push(Relationship::new(
            rel.id,
            start,
            end,
            rel.rel_type.clone(),
            rel.properties.clone(),
        ));
        walk.push(next.clone());
        current = next;
    }
    Ok(Path::new(walk, relationships))
}

fn structure_to_value(s: PackStreamStructure) -> DriverResult<Value> {
    let value = match s.tag {
        tag::NODE => Value::Node(node_from(s)?),
        tag::RELATIONSHIP => {
            let mut f = Fields::open(s, "Relationship", 5)?;
            Value::Relationship(Relationship::new(
                f.int()?,
                f.int()?,
                f.int()?,
                f.string()?,
                f.properties()?,
            ))
        }
        tag::PATH => Value::Path(path_from(s)?),
        tag::POINT_2D => {
            let mut f = Fields::open(s, "Point2D", 3)?;
            Value::Point(Point::new_2d(f.int()?, f.float()?, f.float()?))
        }
        tag::POINT_3D => {
            let mut f = Fields::open(s, "Point3D", 4)?;
            Value::Point(Point::new_3d(f.int()?, f.float()?, f.float()?, f.float()?))
        }
        tag::DATE => {
            let mut f = Fields::open(s, "Date", 1)?;
            let days = f
                .int()?
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .ok_or_else(|| out_of_range("date"))?;
            let date = i32::try_from(days)
                .ok()
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .ok_or_else(|| out_of_range("date"))?;
            Value::Date(date)
        }
        tag::TIME => {
            let mut f = Fields::open(s, "Time", 2)?;
            let time = time_of_day(f.int()?)?;
            let offset_seconds = i32::try_from(f.int()?).map_err(|_| out_of_range("offset"))?;
            Value::Time(OffsetTime { time, offset_seconds })
        }
        tag::LOCAL_TIME => {
            let mut f = Fields::open(s, "LocalTime", 1)?;
            Value::LocalTime(time_of_day(f.int()?)?)
        }
        tag::DATE_TIME => {
            let mut f = Fields::open(s, "DateTime", 3)?;
            let local = naive_from_epoch(f.int()?, f.int()?)?;
            let offset = i32::try_from(f.int()?)
                .ok()
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| out_of_range("offset"))?;
            let datetime = offset
                .from_local_datetime(&local)
                .single()
                .ok_or_else(|| out_of_range("date-time"))?;
            Value::DateTime(datetime)
        }
        tag::DATE_TIME_ZONE_ID => {
            let mut f = Fields::open(s, "DateTimeZoneId", 3)?;
            let datetime = naive_from_epoch(f.int()?, f.int()?)?;
            Value::DateTimeZoneId(ZonedDateTime {
                datetime,
                zone_id: f.string()?,
            })
        }
        tag::LOCAL_DATE_TIME => {
            let mut f = Fields::open(s, "LocalDateTime", 2)?;
            Value::LocalDateTime(naive_from_epoch(f.int()?, f.int()?)?)
        }
        tag::DURATION => {
            let mut f = Fields::open(s, "Duration", 4)?;
            Value::Duration(Duration::new(f.int()?, f.int()?, f.int()?, f.int()?))
        }
        other => {
            return Err(DriverError::protocol(format!(
                "Unknown value structure tag: 0x{:02X}",
                other
            )))
        }
    };
    Ok(value)
}

impl TryFrom<PackStreamValue> for Value {
    type Error = DriverError;

    fn try_from(value: PackStreamValue) -> Result<Self, Self::Error> {
        let value = match value {
            PackStreamValue::Null => Value::Null,
            PackStreamValue::Boolean(b) => Value::Boolean(b),
            PackStreamValue::Integer(i) => Value::Integer(i),
            PackStreamValue::Float(f) => Value::Float(f),
            PackStreamValue::String(s) => Value::String(s),
            PackStreamValue::Bytes(b) => Value::Bytes(b),
            PackStreamValue::List(l) => {
                Value::List(l.into_iter().map(Value::try_from).collect::<DriverResult<_>>()?)
            }
            PackStreamValue::Map(m) => Value::Map(convert_map(m)?),
            PackStreamValue::Structure(s) => structure_to_value(s)?,
        };
        Ok(value)
    }
}

// ============================================================================
// TryFrom implementations
// ============================================================================

macro_rules! value_try_into {
    ($($target:ty => $name:literal, |$v:ident| $extract:expr);* $(;)?) => {
        $(
            impl TryFrom<Value> for $target {
                type Error = DriverError;

                fn try_from($v: Value) -> Result<Self, Self::Error> {
                    let type_name = $v.type_name();
                    $extract.ok_or_else(|| {
                        DriverError::type_conversion(format!(
                            "Cannot convert {} to {}",
                            type_name, $name
                        ))
                    })
                }
            }
        )*
    };
}

value_try_into! {
    bool => "bool", |v| v.as_bool();
    i64 => "i64", |v| v.as_int();
    f64 => "f64", |v| v.as_float();
    String => "String", |v| match v { Value::String(s) => Some(s), _ => None };
    Vec<Value> => "List", |v| match v { Value::List(l) => Some(l), _ => None };
    HashMap<String, Value> => "Map", |v| match v { Value::Map(m) => Some(m), _ => None };
    Node => "Node", |v| match v { Value::Node(n) => Some(n), _ => None };
    Relationship => "Relationship", |v| match v { Value::Relationship(r) => Some(r), _ => None };
    Path => "Path", |v| match v { Value::Path(p) => Some(p), _ => None };
    Point => "Point", |v| match v { Value::Point(p) => Some(p), _ => None };
    NaiveDate => "Date", |v| match v { Value::Date(d) => Some(d), _ => None };
    DateTime<FixedOffset> => "DateTime", |v| match v { Value::DateTime(dt) => Some(dt), _ => None };
    NaiveDateTime => "LocalDateTime", |v| match v { Value::LocalDateTime(dt) => Some(dt), _ => None };
    Duration => "Duration", |v| match v { Value::Duration(d) => Some(d), _ => None };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn structure(tag: u8, fields: Vec<PackStreamValue>) -> PackStreamValue {
        PackStreamValue::Structure(PackStreamStructure::new(tag, fields))
    }

    fn node(id: i64, label: &str) -> PackStreamValue {
        structure(
            tag::NODE,
            vec![
                id.into(),
                PackStreamValue::List(vec![label.into()]),
                PackStreamValue::Map(HashMap::new()),
            ],
        )
    }

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(42).as_int(), Some(42));
        assert_eq!(Value::Integer(2).as_float(), Some(2.0));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::from(Some(7i64)), Value::Integer(7));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_value_try_from() {
        assert_eq!(i64::try_from(Value::Integer(1)).unwrap(), 1);
        assert_eq!(f64::try_from(Value::Integer(2)).unwrap(), 2.0);
        let err = bool::try_from(Value::String("yes".into())).unwrap_err();
        assert_eq!(err.to_string(), "Type conversion error: Cannot convert String to bool");
    }

    #[test]
    fn test_decode_node_and_relationship() {
        let mut props = HashMap::new();
        props.insert("name".to_string(), PackStreamValue::from("Alice"));
        let raw = structure(
            tag::NODE,
            vec![1.into(), PackStreamValue::List(vec!["Person".into()]), PackStreamValue::Map(props)],
        );
        let node = Node::try_from(Value::try_from(raw).unwrap()).unwrap();
        assert!(node.has_label("Person"));
        assert_eq!(node.get_as::<String>("name").unwrap(), "Alice");
        assert_eq!(node.to_string(), "(1:Person)");

        let raw = structure(
            tag::RELATIONSHIP,
            vec![9.into(), 1.into(), 2.into(), "KNOWS".into(), PackStreamValue::Map(HashMap::new())],
        );
        let rel = Relationship::try_from(Value::try_from(raw).unwrap()).unwrap();
        assert_eq!((rel.start_node_id, rel.end_node_id), (1, 2));
        assert_eq!(rel.rel_type, "KNOWS");
    }

    #[test]
    fn test_decode_path_with_reversed_hop() {
        let unbound = |id: i64| {
            structure(
                tag::UNBOUND_RELATIONSHIP,
                vec![id.into(), "LINK".into(), PackStreamValue::Map(HashMap::new())],
            )
        };
        // (a)-[10]->(b)<-[11]-(c)
        let raw = structure(
            tag::PATH,
            vec![
                PackStreamValue::List(vec![node(1, "A"), node(2, "B"), node(3, "C")]),
                PackStreamValue::List(vec![unbound(10), unbound(11)]),
                PackStreamValue::List(vec![1.into(), 1.into(), (-2).into(), 2.into()]),
            ],
        );
        let path = Path::try_from(Value::try_from(raw).unwrap()).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.start().unwrap().id, 1);
        assert_eq!(path.end().unwrap().id, 3);
        assert_eq!((path.relationships[0].start_node_id, path.relationships[0].end_node_id), (1, 2));
        assert_eq!((path.relationships[1].start_node_id, path.relationships[1].end_node_id), (3, 2));
    }

    #[test]
    fn test_bad_path_index_is_rejected() {
        let raw = structure(
            tag::PATH,
            vec![
                PackStreamValue::List(vec![node(1, "A")]),
                PackStreamValue::List(vec![]),
                PackStreamValue::List(vec![1.into(), 0.into()]),
            ],
        );
        assert!(matches!(Value::try_from(raw), Err(DriverError::Protocol(_))));
    }

    #[test]
    fn test_temporal_values() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let encoded = Value::Date(date).to_packstream().unwrap();
        let days = encoded.as_structure().unwrap().fields[0].as_int().unwrap();
        assert_eq!(days, 19782);
        assert_eq!(Value::try_from(encoded).unwrap(), Value::Date(date));

        let offset = FixedOffset::east_opt(3600).unwrap();
        let dt = offset.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let encoded = Value::DateTime(dt).to_packstream().unwrap();
        let fields = &encoded.as_structure().unwrap().fields;
        // local seconds, not UTC
        assert_eq!(fields[0].as_int(), Some(1_704_110_400));
        assert_eq!(fields[2].as_int(), Some(3600));
        assert_eq!(Value::try_from(encoded).unwrap(), Value::DateTime(dt));

        let raw = structure(tag::LOCAL_TIME, vec![(3_600 * NANOS_PER_SECOND + 5).into()]);
        let time = NaiveTime::from_hms_nano_opt(1, 0, 0, 5).unwrap();
        assert_eq!(Value::try_from(raw).unwrap(), Value::LocalTime(time));

        let raw = structure(tag::DURATION, vec![14.into(), 3.into(), 30.into(), 0.into()]);
        assert_eq!(Value::try_from(raw).unwrap(), Value::Duration(Duration::new(14, 3, 30, 0)));
    }

    #[test]
    fn test_temporal_values_out_of_range() {
        for days in [i64::MAX, i64::MIN, i64::from(i32::MAX)] {
            let raw = structure(tag::DATE, vec![PackStreamValue::Integer(days)]);
            assert!(matches!(Value::try_from(raw), Err(DriverError::Protocol(_))), "{}", days);
        }
        let raw = structure(tag::LOCAL_TIME, vec![PackStreamValue::Integer(i64::MAX)]);
        assert!(matches!(Value::try_from(raw), Err(DriverError::Protocol(_))));
        let raw = structure(
            tag::LOCAL_DATE_TIME,
            vec![PackStreamValue::Integer(i64::MAX), PackStreamValue::Integer(-1)],
        );
        assert!(matches!(Value::try_from(raw), Err(DriverError::Protocol(_))));
    }

    #[test]
    fn test_points() {
        let encoded = Value::Point(Point::cartesian_2d(1.0, 2.0)).to_packstream().unwrap();
        assert_eq!(encoded.as_structure().unwrap().tag, tag::POINT_2D);
        let back = Point::try_from(Value::try_from(encoded).unwrap()).unwrap();
        assert_eq!(back.srid, 7203);
        assert!(!back.is_3d());
    }

    #[test]
    fn test_graph_entities_are_not_parameters() {
        let node = Value::Node(Node::new(1, vec![], HashMap::new()));
        assert!(matches!(node.to_packstream(), Err(BoltError::Encode(_))));
        let nested = Value::List(vec![Value::Integer(1), node]);
        assert!(matches!(nested.to_packstream(), Err(BoltError::Encode(_))));
    }

    #[test]
    fn test_unknown_structure_is_an_error() {
        let raw = structure(0x01, vec![]);
        assert!(matches!(Value::try_from(raw), Err(DriverError::Protocol(_))));
        let wrong_arity = structure(tag::DATE, vec![]);
        assert!(matches!(Value::try_from(wrong_arity), Err(DriverError::Protocol(_))));
    }

    #[test]
    fn test_serialize_is_untagged() {
        let mut props = HashMap::new();
        props.insert("age".to_string(), Value::Integer(30));
        let json = serde_json::to_value(Value::Node(Node::new(1, vec!["Person".into()], props))).unwrap();
        assert_eq!(json["labels"][0], "Person");
        assert_eq!(json["properties"]["age"], 30);
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
    }
}
