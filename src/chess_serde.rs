//! Serde adapters for the [`shakmaty`] types that appear in game snapshots.

pub mod position_serde {
    use std::str::FromStr;

    use serde::{
        de::{Error, Visitor},
        Deserializer, Serializer,
    };
    use shakmaty::{fen::Fen, CastlingMode, Chess, EnPassantMode};

    pub fn serialize<S: Serializer>(position: &Chess, ser: S) -> Result<S::Ok, S::Error> {
        let fen = Fen::from_position(position.clone(), EnPassantMode::Legal);
        ser.serialize_str(&fen.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Chess, D::Error> {
        struct FenVisitor {}
        impl<'de> Visitor<'de> for FenVisitor {
            type Value = Chess;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "a chess position in FEN")
            }
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let fen = Fen::from_str(v)
                    .map_err(|e| Error::custom(format!("bad FEN `{v}`: {e}")))?;
                fen.into_position(CastlingMode::Standard).map_err(|e| {
                    Error::custom(format!("FEN `{v}` is not a playable position: {e}"))
                })
            }
        }
        d.deserialize_string(FenVisitor {})
    }
}

pub mod san_serde {
    use std::str::FromStr;

    use serde::{
        de::{Error, Visitor},
        Deserializer, Serializer,
    };
    use shakmaty::san::SanPlus;

    pub fn serialize<S: Serializer>(san: &SanPlus, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&san.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SanPlus, D::Error> {
        struct SanVisitor {}
        impl<'de> Visitor<'de> for SanVisitor {
            type Value = SanPlus;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "a move in short algebraic notation")
            }
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                SanPlus::from_str(v)
                    .map_err(|_| Error::custom(format!("error in parsing SAN `{v}`")))
            }
        }
        d.deserialize_string(SanVisitor {})
    }
}

pub mod color_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use shakmaty::Color;

    pub fn serialize<S: Serializer>(c: &Color, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(crate::rules::side_name(*c))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Color, D::Error> {
        let name = String::deserialize(d)?;
        match name.as_str() {
            "white" => Ok(Color::White),
            "black" => Ok(Color::Black),
            other => Err(Error::custom(format!("unknown side `{other}`"))),
        }
    }
}
