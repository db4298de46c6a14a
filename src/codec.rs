//! Wire codec: places a [`Value`] into a claimed slot and reads it back out.
//!
//! Placement is two-tier. Values whose encoded form fits the 480-byte inline
//! tail of the slot record are written there ("static"); larger values get a
//! region from the payload arena ("dynamic"), with the region slot index
//! packed into the meta word so the consumer can free it after decode.
//! Header-only shapes (numbers, booleans, dates) use no payload bytes at all:
//! the immediate value lives in the `start`/`end` header words.
//!
//! Decode always copies payload bytes out before freeing the region or
//! letting the slot re-arm, so a decoded [`Value`] never aliases shared
//! memory.

use crate::arena::{HeaderTable, PayloadArena};
use crate::error::{EncodeError, RejectReason};
use crate::layout::{
    meta_region_slot, meta_timeout_ms, pack_slot_meta, STATIC_CAPACITY_BYTES, W_END,
    W_FLAGS_OR_FN, W_ID, W_PAYLOAD_LEN, W_SLOT_META, W_START, W_TYPE,
};
use crate::region::{RegionReclaimer, RegionRegistry, RegionSector};
use crate::task::Task;
use crate::value::{BigIntValue, ErrorValue, Symbol, Value};

/// Wire type tags. The numbering is part of the shared-memory contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TypeTag {
    /// Never written by a correct encoder. Seeing it on decode means the
    /// slot handshake was violated.
    Unreachable = 0,
    Int = 2,
    True = 3,
    False = 4,
    Undefined = 5,
    Nan = 6,
    Infinity = 7,
    NegInfinity = 8,
    Float64 = 9,
    Null = 10,
    String = 11,
    StaticString = 12,
    Json = 13,
    StaticJson = 14,
    Binary = 15,
    StaticBinary = 16,
    BigInt = 17,
    StaticBigInt = 18,
    Symbol = 19,
    StaticSymbol = 20,
    I32Array = 21,
    F64Array = 22,
    I64Array = 23,
    U64Array = 24,
    ByteView = 25,
    ErrorShape = 26,
    Date = 27,
}

impl TypeTag {
    fn from_wire(v: u32) -> Option<TypeTag> {
        Some(match v {
            0 => TypeTag::Unreachable,
            2 => TypeTag::Int,
            3 => TypeTag::True,
            4 => TypeTag::False,
            5 => TypeTag::Undefined,
            6 => TypeTag::Nan,
            7 => TypeTag::Infinity,
            8 => TypeTag::NegInfinity,
            9 => TypeTag::Float64,
            10 => TypeTag::Null,
            11 => TypeTag::String,
            12 => TypeTag::StaticString,
            13 => TypeTag::Json,
            14 => TypeTag::StaticJson,
            15 => TypeTag::Binary,
            16 => TypeTag::StaticBinary,
            17 => TypeTag::BigInt,
            18 => TypeTag::StaticBigInt,
            19 => TypeTag::Symbol,
            20 => TypeTag::StaticSymbol,
            21 => TypeTag::I32Array,
            22 => TypeTag::F64Array,
            23 => TypeTag::I64Array,
            24 => TypeTag::U64Array,
            25 => TypeTag::ByteView,
            26 => TypeTag::ErrorShape,
            27 => TypeTag::Date,
            _ => return None,
        })
    }

    /// Tags whose payload lives in an arena region the decoder must free.
    fn is_dynamic(self) -> bool {
        matches!(
            self,
            TypeTag::String
                | TypeTag::Json
                | TypeTag::Binary
                | TypeTag::BigInt
                | TypeTag::Symbol
                | TypeTag::I32Array
                | TypeTag::F64Array
                | TypeTag::I64Array
                | TypeTag::U64Array
                | TypeTag::ByteView
                | TypeTag::ErrorShape
        )
    }
}

#[inline]
fn split_u64(bits: u64) -> (u32, u32) {
    (bits as u32, (bits >> 32) as u32)
}

#[inline]
fn join_u64(lo: u32, hi: u32) -> u64 {
    (lo as u64) | ((hi as u64) << 32)
}

fn bigint_bytes(v: &BigIntValue) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + v.magnitude.len());
    out.push(v.negative as u8);
    out.extend_from_slice(&v.magnitude);
    out
}

fn error_bytes(v: &ErrorValue) -> Vec<u8> {
    let name = v.name.as_bytes();
    let mut out = Vec::with_capacity(4 + name.len() + v.message.len());
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(v.message.as_bytes());
    out
}

fn le_bytes<const N: usize, T: Copy>(items: &[T], to: impl Fn(T) -> [u8; N]) -> Vec<u8> {
    let mut out = Vec::with_capacity(items.len() * N);
    for &item in items {
        out.extend_from_slice(&to(item));
    }
    out
}

/// How a value will be placed, resolved before any slot state is touched so
/// rejections leave the channel untouched.
enum Placement {
    /// Immediate data in the start/end words.
    Immediate { tag: TypeTag, start: u32, end: u32 },
    /// Bytes in the slot's inline tail.
    Static { tag: TypeTag, bytes: Vec<u8> },
    /// Bytes in an arena region; tag is already the dynamic variant.
    Dynamic { tag: TypeTag, bytes: Vec<u8> },
}

/// Pick static vs dynamic placement for a byte payload. At exactly the
/// static capacity the inline tail wins.
fn place_bytes(static_tag: TypeTag, dynamic_tag: TypeTag, bytes: Vec<u8>) -> Placement {
    if bytes.len() <= STATIC_CAPACITY_BYTES {
        Placement::Static {
            tag: static_tag,
            bytes,
        }
    } else {
        Placement::Dynamic {
            tag: dynamic_tag,
            bytes,
        }
    }
}

fn resolve(value: &Value, max_payload: usize) -> std::result::Result<Placement, RejectReason> {
    let placement = match value {
        Value::Undefined => Placement::Immediate {
            tag: TypeTag::Undefined,
            start: 0,
            end: 0,
        },
        Value::Null => Placement::Immediate {
            tag: TypeTag::Null,
            start: 0,
            end: 0,
        },
        Value::Bool(b) => Placement::Immediate {
            tag: if *b { TypeTag::True } else { TypeTag::False },
            start: 0,
            end: 0,
        },
        Value::Int(v) => {
            let (start, end) = split_u64(*v as u64);
            Placement::Immediate {
                tag: TypeTag::Int,
                start,
                end,
            }
        }
        Value::Float(v) => {
            if v.is_nan() {
                Placement::Immediate {
                    tag: TypeTag::Nan,
                    start: 0,
                    end: 0,
                }
            } else if *v == f64::INFINITY {
                Placement::Immediate {
                    tag: TypeTag::Infinity,
                    start: 0,
                    end: 0,
                }
            } else if *v == f64::NEG_INFINITY {
                Placement::Immediate {
                    tag: TypeTag::NegInfinity,
                    start: 0,
                    end: 0,
                }
            } else {
                let (start, end) = split_u64(v.to_bits());
                Placement::Immediate {
                    tag: TypeTag::Float64,
                    start,
                    end,
                }
            }
        }
        Value::Date(millis) => {
            let (start, end) = split_u64(millis.to_bits());
            Placement::Immediate {
                tag: TypeTag::Date,
                start,
                end,
            }
        }
        Value::Str(s) => place_bytes(
            TypeTag::StaticString,
            TypeTag::String,
            s.as_bytes().to_vec(),
        ),
        Value::Json(v) => {
            let text = serde_json::to_vec(v)
                .map_err(|e| RejectReason::StructuralSerializationFailed(e.to_string()))?;
            place_bytes(TypeTag::StaticJson, TypeTag::Json, text)
        }
        Value::Bytes(b) => place_bytes(TypeTag::StaticBinary, TypeTag::Binary, b.clone()),
        Value::BigInt(v) => place_bytes(
            TypeTag::StaticBigInt,
            TypeTag::BigInt,
            bigint_bytes(v),
        ),
        Value::Symbol(sym) => {
            let key = sym.key().ok_or(RejectReason::SymbolNotRegistered)?;
            place_bytes(TypeTag::StaticSymbol, TypeTag::Symbol, key.into_bytes())
        }
        Value::ByteView(b) => Placement::Dynamic {
            tag: TypeTag::ByteView,
            bytes: b.clone(),
        },
        Value::I32Array(v) => Placement::Dynamic {
            tag: TypeTag::I32Array,
            bytes: le_bytes(v, i32::to_le_bytes),
        },
        Value::F64Array(v) => Placement::Dynamic {
            tag: TypeTag::F64Array,
            bytes: le_bytes(v, f64::to_le_bytes),
        },
        Value::I64Array(v) => Placement::Dynamic {
            tag: TypeTag::I64Array,
            bytes: le_bytes(v, i64::to_le_bytes),
        },
        Value::U64Array(v) => Placement::Dynamic {
            tag: TypeTag::U64Array,
            bytes: le_bytes(v, u64::to_le_bytes),
        },
        Value::Error(e) => Placement::Dynamic {
            tag: TypeTag::ErrorShape,
            bytes: error_bytes(e),
        },
        Value::Function(_) => return Err(RejectReason::FunctionNotSerializable),
    };

    let len = match &placement {
        Placement::Immediate { .. } => 0,
        Placement::Static { bytes, .. } | Placement::Dynamic { bytes, .. } => bytes.len(),
    };
    if len > max_payload {
        return Err(RejectReason::PayloadTooLarge {
            len,
            max: max_payload,
        });
    }
    Ok(placement)
}

/// Encode `task` into slot `slot`.
///
/// On `Err(Reject(..))` the call is dead but the channel is untouched; on
/// `Err(RegionFull)` nothing was written either and the caller should retry
/// after the consumer frees regions. The caller publishes the slot by
/// flipping its lock bit after this returns `Ok`.
pub(crate) fn encode_payload(
    headers: &HeaderTable,
    arena: &PayloadArena,
    registry: &mut RegionRegistry,
    sector: &RegionSector,
    slot: usize,
    task: &Task,
    max_payload: usize,
) -> std::result::Result<(), EncodeError> {
    let placement = resolve(&task.value, max_payload).map_err(EncodeError::Reject)?;

    let (tag, start, end, payload_len, region_slot) = match placement {
        Placement::Immediate { tag, start, end } => (tag, start, end, 0u32, 0u32),
        Placement::Static { tag, bytes } => {
            unsafe { headers.write_inline(slot, &bytes) };
            (tag, 0, 0, bytes.len() as u32, 0)
        }
        Placement::Dynamic { tag, bytes } => {
            let region = registry
                .allocate(sector, bytes.len() as u32)
                .map_err(|_| EncodeError::RegionFull)?;
            let start = region.start;
            let end = start + bytes.len() as u32;
            arena.commit_to(end as usize);
            unsafe { arena.write(start as usize, &bytes) };
            (tag, start, end, bytes.len() as u32, region.index)
        }
    };

    unsafe {
        headers.store_word(slot, W_FLAGS_OR_FN, task.flags_or_fn);
        headers.store_word(slot, W_ID, task.id);
        headers.store_word(slot, W_TYPE, tag as u32);
        headers.store_word(slot, W_START, start);
        headers.store_word(slot, W_END, end);
        headers.store_word(slot, W_PAYLOAD_LEN, payload_len);
        headers.store_word(
            slot,
            W_SLOT_META,
            pack_slot_meta(region_slot, task.timeout_ms),
        );
    }
    Ok(())
}

fn decode_typed<const N: usize, T>(bytes: &[u8], from: impl Fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|c| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(c);
            from(buf)
        })
        .collect()
}

/// Decode slot `slot` into `task`, freeing the payload region if the frame
/// used one. The caller must have observed the slot's lock-bit flip, and
/// re-arms the slot only after this returns.
///
/// Panics on a tag the encoder can never emit: that is memory corruption or
/// a handshake violation, not a recoverable condition.
pub(crate) fn decode_payload(
    headers: &HeaderTable,
    arena: &PayloadArena,
    reclaimer: &mut RegionReclaimer,
    sector: &RegionSector,
    slot: usize,
    task: &mut Task,
) {
    let (flags_or_fn, id, raw_tag, start, end, payload_len, meta) = unsafe {
        (
            headers.load_word(slot, W_FLAGS_OR_FN),
            headers.load_word(slot, W_ID),
            headers.load_word(slot, W_TYPE),
            headers.load_word(slot, W_START),
            headers.load_word(slot, W_END),
            headers.load_word(slot, W_PAYLOAD_LEN),
            headers.load_word(slot, W_SLOT_META),
        )
    };

    let tag = match TypeTag::from_wire(raw_tag) {
        Some(TypeTag::Unreachable) | None => {
            panic!(
                "corrupted frame in slot {}: type tag {} (id {})",
                slot, raw_tag, id
            );
        }
        Some(tag) => tag,
    };

    let bytes: Vec<u8> = if tag.is_dynamic() {
        debug_assert_eq!(end - start, payload_len);
        let copied = unsafe { arena.read_copy(start as usize, payload_len as usize) };
        reclaimer.free(sector, meta_region_slot(meta));
        copied
    } else {
        match tag {
            TypeTag::StaticString
            | TypeTag::StaticJson
            | TypeTag::StaticBinary
            | TypeTag::StaticBigInt
            | TypeTag::StaticSymbol => unsafe { headers.read_inline(slot, payload_len as usize) },
            _ => Vec::new(),
        }
    };

    task.flags_or_fn = flags_or_fn;
    task.id = id;
    task.timeout_ms = meta_timeout_ms(meta);
    task.value = match tag {
        TypeTag::Unreachable => unreachable!(),
        TypeTag::Int => Value::Int(join_u64(start, end) as i64),
        TypeTag::True => Value::Bool(true),
        TypeTag::False => Value::Bool(false),
        TypeTag::Undefined => Value::Undefined,
        TypeTag::Null => Value::Null,
        TypeTag::Nan => Value::Float(f64::NAN),
        TypeTag::Infinity => Value::Float(f64::INFINITY),
        TypeTag::NegInfinity => Value::Float(f64::NEG_INFINITY),
        TypeTag::Float64 => Value::Float(f64::from_bits(join_u64(start, end))),
        TypeTag::Date => Value::Date(f64::from_bits(join_u64(start, end))),
        TypeTag::String | TypeTag::StaticString => {
            Value::Str(String::from_utf8_lossy(&bytes).into_owned())
        }
        TypeTag::Json | TypeTag::StaticJson => match serde_json::from_slice(&bytes) {
            Ok(v) => Value::Json(v),
            Err(e) => panic!("corrupted frame in slot {}: bad JSON payload: {}", slot, e),
        },
        TypeTag::Binary | TypeTag::StaticBinary => Value::Bytes(bytes),
        TypeTag::ByteView => Value::ByteView(bytes),
        TypeTag::BigInt | TypeTag::StaticBigInt => {
            let (sign, magnitude) = match bytes.split_first() {
                Some((&sign, rest)) => (sign != 0, rest.to_vec()),
                None => (false, Vec::new()),
            };
            Value::BigInt(BigIntValue {
                negative: sign,
                magnitude,
            })
        }
        TypeTag::Symbol | TypeTag::StaticSymbol => {
            Value::Symbol(Symbol::for_key(&String::from_utf8_lossy(&bytes)))
        }
        TypeTag::I32Array => Value::I32Array(decode_typed(&bytes, i32::from_le_bytes)),
        TypeTag::F64Array => Value::F64Array(decode_typed(&bytes, f64::from_le_bytes)),
        TypeTag::I64Array => Value::I64Array(decode_typed(&bytes, i64::from_le_bytes)),
        TypeTag::U64Array => Value::U64Array(decode_typed(&bytes, u64::from_le_bytes)),
        TypeTag::ErrorShape => {
            if bytes.len() < 4 {
                panic!("corrupted frame in slot {}: truncated error payload", slot);
            }
            let name_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
            let name_end = 4 + name_len;
            if name_end > bytes.len() {
                panic!("corrupted frame in slot {}: truncated error payload", slot);
            }
            Value::Error(ErrorValue {
                name: String::from_utf8_lossy(&bytes[4..name_end]).into_owned(),
                message: String::from_utf8_lossy(&bytes[name_end..]).into_owned(),
            })
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayloadConfig;

    struct Rig {
        headers: HeaderTable,
        arena: PayloadArena,
        registry: RegionRegistry,
        sector: RegionSector,
        reclaimer: RegionReclaimer,
        max_payload: usize,
    }

    impl Rig {
        fn new() -> Self {
            let cfg = PayloadConfig::small().validated().unwrap();
            let arena = PayloadArena::new(&cfg);
            let registry = RegionRegistry::new(arena.data_len());
            Rig {
                headers: HeaderTable::new(),
                arena,
                registry,
                sector: RegionSector::new(),
                reclaimer: RegionReclaimer::new(),
                max_payload: cfg.max_payload_bytes,
            }
        }

        fn roundtrip(&mut self, value: Value) -> Task {
            let task = Task::request(1, 42, value);
            encode_payload(
                &self.headers,
                &self.arena,
                &mut self.registry,
                &self.sector,
                0,
                &task,
                self.max_payload,
            )
            .unwrap();
            let mut out = Task::request(0, 0, Value::Undefined);
            decode_payload(
                &self.headers,
                &self.arena,
                &mut self.reclaimer,
                &self.sector,
                0,
                &mut out,
            );
            out
        }

        fn encode_err(&mut self, value: Value) -> EncodeError {
            let task = Task::request(1, 42, value);
            encode_payload(
                &self.headers,
                &self.arena,
                &mut self.registry,
                &self.sector,
                0,
                &task,
                self.max_payload,
            )
            .unwrap_err()
        }
    }

    #[test]
    fn header_only_shapes() {
        let mut rig = Rig::new();
        assert_eq!(rig.roundtrip(Value::Undefined).value, Value::Undefined);
        assert_eq!(rig.roundtrip(Value::Null).value, Value::Null);
        assert_eq!(rig.roundtrip(Value::Bool(true)).value, Value::Bool(true));
        assert_eq!(rig.roundtrip(Value::Bool(false)).value, Value::Bool(false));
        assert_eq!(rig.roundtrip(Value::Int(-7)).value, Value::Int(-7));
        assert_eq!(
            rig.roundtrip(Value::Int(i64::MIN)).value,
            Value::Int(i64::MIN)
        );
        assert_eq!(
            rig.roundtrip(Value::Int(i64::MAX)).value,
            Value::Int(i64::MAX)
        );
        assert_eq!(
            rig.roundtrip(Value::Float(2.5)).value,
            Value::Float(2.5)
        );
        assert_eq!(
            rig.roundtrip(Value::Float(f64::INFINITY)).value,
            Value::Float(f64::INFINITY)
        );
        assert_eq!(
            rig.roundtrip(Value::Float(f64::NEG_INFINITY)).value,
            Value::Float(f64::NEG_INFINITY)
        );
        assert_eq!(
            rig.roundtrip(Value::Date(1_699_999_999_123.0)).value,
            Value::Date(1_699_999_999_123.0)
        );
        match rig.roundtrip(Value::Float(f64::NAN)).value {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("expected NaN, got {:?}", other),
        }
    }

    #[test]
    fn header_fields_survive() {
        let mut rig = Rig::new();
        let mut task = Task::request(9, 1234, Value::Int(1));
        task.timeout_ms = 5000;
        encode_payload(
            &rig.headers,
            &rig.arena,
            &mut rig.registry,
            &rig.sector,
            3,
            &task,
            rig.max_payload,
        )
        .unwrap();
        let mut out = Task::request(0, 0, Value::Undefined);
        decode_payload(
            &rig.headers,
            &rig.arena,
            &mut rig.reclaimer,
            &rig.sector,
            3,
            &mut out,
        );
        assert_eq!(out.flags_or_fn, 9);
        assert_eq!(out.id, 1234);
        assert_eq!(out.timeout_ms, 5000);
    }

    #[test]
    fn static_dynamic_boundary() {
        let mut rig = Rig::new();

        // Exactly the inline capacity stays static: no region is consumed.
        let at_cap = "x".repeat(STATIC_CAPACITY_BYTES);
        assert_eq!(
            rig.roundtrip(Value::Str(at_cap.clone())).value,
            Value::Str(at_cap)
        );
        assert_eq!(rig.registry.live(), 0);

        // One byte more goes dynamic, and the region is freed after decode.
        let over_cap = "y".repeat(STATIC_CAPACITY_BYTES + 1);
        assert_eq!(
            rig.roundtrip(Value::Str(over_cap.clone())).value,
            Value::Str(over_cap)
        );
        assert_eq!(rig.registry.live(), 1);
        rig.registry.compact_and_reclaim(&rig.sector);
        assert_eq!(rig.registry.live(), 0);
    }

    #[test]
    fn string_bytes_bigint_json() {
        let mut rig = Rig::new();
        assert_eq!(
            rig.roundtrip(Value::Str("héllo".into())).value,
            Value::Str("héllo".into())
        );
        assert_eq!(
            rig.roundtrip(Value::Bytes(vec![1, 2, 3])).value,
            Value::Bytes(vec![1, 2, 3])
        );
        let big = Value::BigInt(BigIntValue::from_i128(-123_456_789_012_345_678_901_i128));
        assert_eq!(rig.roundtrip(big.clone()).value, big);
        let json = Value::Json(serde_json::json!({"a": [1, 2, {"b": null}]}));
        assert_eq!(rig.roundtrip(json.clone()).value, json);
    }

    #[test]
    fn typed_arrays_are_dynamic() {
        let mut rig = Rig::new();
        let v = Value::I32Array(vec![-1, 0, i32::MAX]);
        assert_eq!(rig.roundtrip(v.clone()).value, v);
        let v = Value::F64Array(vec![0.5, -2.25]);
        assert_eq!(rig.roundtrip(v.clone()).value, v);
        let v = Value::I64Array(vec![i64::MIN, i64::MAX]);
        assert_eq!(rig.roundtrip(v.clone()).value, v);
        let v = Value::U64Array(vec![0, u64::MAX]);
        assert_eq!(rig.roundtrip(v.clone()).value, v);
        // Even tiny typed arrays take the dynamic path; decode frees them.
        rig.registry.compact_and_reclaim(&rig.sector);
        assert_eq!(rig.registry.live(), 0);
    }

    #[test]
    fn byte_view_decodes_as_owned_copy() {
        let mut rig = Rig::new();
        let v = Value::ByteView(vec![9u8; 700]);
        match rig.roundtrip(v).value {
            Value::ByteView(b) => assert_eq!(b, vec![9u8; 700]),
            other => panic!("expected ByteView, got {:?}", other),
        }
    }

    #[test]
    fn error_shape_roundtrip() {
        let mut rig = Rig::new();
        let v = Value::Error(ErrorValue {
            name: "RangeError".into(),
            message: "index out of bounds".into(),
        });
        assert_eq!(rig.roundtrip(v.clone()).value, v);
    }

    #[test]
    fn registered_symbol_roundtrips_by_key() {
        let mut rig = Rig::new();
        let sym = Symbol::for_key("codec-test-symbol");
        assert_eq!(
            rig.roundtrip(Value::Symbol(sym)).value,
            Value::Symbol(sym)
        );
    }

    #[test]
    fn rejections_are_terminal_and_named() {
        let mut rig = Rig::new();

        let err = rig.encode_err(Value::Function("callback".into()));
        assert_eq!(
            err,
            EncodeError::Reject(RejectReason::FunctionNotSerializable)
        );
        assert!(!err.is_transient());

        let err = rig.encode_err(Value::Symbol(Symbol::unique()));
        assert_eq!(err, EncodeError::Reject(RejectReason::SymbolNotRegistered));

        let cap = rig.max_payload;
        let err = rig.encode_err(Value::Bytes(vec![0u8; cap + 1]));
        assert!(matches!(
            err,
            EncodeError::Reject(RejectReason::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn region_exhaustion_is_transient() {
        let mut rig = Rig::new();
        // Fill the arena with undecoded dynamic payloads.
        let chunk = rig.arena.data_len() / 4;
        let mut slot = 0;
        let err = loop {
            let task = Task::request(1, slot as u32, Value::Bytes(vec![0u8; chunk]));
            match encode_payload(
                &rig.headers,
                &rig.arena,
                &mut rig.registry,
                &rig.sector,
                slot % 32,
                &task,
                rig.max_payload.max(chunk),
            ) {
                Ok(()) => slot += 1,
                Err(e) => break e,
            }
        };
        assert_eq!(err, EncodeError::RegionFull);
        assert!(err.is_transient());
    }
}
