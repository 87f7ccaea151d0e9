// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Elliptic curve layer.
//!
//! The protocol runs over secp256k1. [`CurvePoint`] wraps
//! [`k256::ProjectivePoint`] so that we can define our own serialization and
//! the handful of conversions between curve scalars and the [`BigNumber`]s
//! the rest of the crate computes with.

use crate::errors::{CallerError, InternalError, Result};
use k256::{
    elliptic_curve::{
        bigint::Encoding,
        group::GroupEncoding,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Curve, PrimeField,
    },
    AffinePoint, EncodedPoint, FieldBytes, Scalar,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::error;
use zeroize::{Zeroize, Zeroizing};

/// A point on the secp256k1 curve.
///
/// Note that this type derives [`Debug`]; if a [`CurvePoint`] is used in a
/// private type, `Debug` should be manually implemented with the field of
/// this type explicitly redacted!
#[derive(Eq, PartialEq, Debug, Clone, Copy, Zeroize)]
pub struct CurvePoint(k256::ProjectivePoint);

impl CurvePoint {
    /// The canonical generator of the curve's prime-order group.
    pub const GENERATOR: Self = CurvePoint(k256::ProjectivePoint::GENERATOR);

    /// The identity point, used to initialize point aggregations.
    pub const IDENTITY: Self = CurvePoint(k256::ProjectivePoint::IDENTITY);

    /// Multiply `self` by a [`BigNumber`], which is first reduced into the
    /// curve's scalar field.
    ///
    /// Note: This method ends up cloning the scalar value in the process of
    /// converting it. This may be insecure if the scalar contains private
    /// data.
    pub fn multiply_by_bignum(&self, scalar: &BigNumber) -> Result<Self> {
        let s = Zeroizing::new(bn_to_scalar(scalar)?);
        Ok(self.multiply_by_scalar(&s))
    }

    /// Multiply `self` by a curve scalar.
    pub fn multiply_by_scalar(&self, scalar: &Scalar) -> Self {
        Self(self.0 * scalar)
    }

    /// Whether this is the identity point.
    pub(crate) fn is_identity(&self) -> bool {
        self.0 == k256::ProjectivePoint::IDENTITY
    }

    /// The affine coordinates of this point as non-negative integers.
    ///
    /// The identity has no affine representation and is rejected.
    pub(crate) fn to_affine_coordinates(&self) -> Result<(BigNumber, BigNumber)> {
        if self.is_identity() {
            error!("The identity point has no affine coordinates");
            return Err(InternalError::InternalInvariantFailed);
        }
        let encoded = self.0.to_affine().to_encoded_point(false);
        let x = encoded.x().ok_or(InternalError::InternalInvariantFailed)?;
        let y = encoded.y().ok_or(InternalError::InternalInvariantFailed)?;
        Ok((BigNumber::from_slice(x), BigNumber::from_slice(y)))
    }

    /// Reconstruct a point from affine coordinates, verifying that the pair
    /// lies on the curve.
    pub(crate) fn try_from_affine_coordinates(x: &BigNumber, y: &BigNumber) -> Result<Self> {
        let field_len = FieldBytes::default().len();
        let x_bytes = crate::utils::fixed_be_bytes(x, field_len).map_err(|_| {
            error!("Affine x-coordinate does not fit in the field");
            InternalError::from(CallerError::DeserializationFailed)
        })?;
        let y_bytes = crate::utils::fixed_be_bytes(y, field_len).map_err(|_| {
            error!("Affine y-coordinate does not fit in the field");
            InternalError::from(CallerError::DeserializationFailed)
        })?;
        let encoded = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x_bytes),
            FieldBytes::from_slice(&y_bytes),
            false,
        );
        let point: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
        match point {
            Some(point) => Ok(Self(point.into())),
            None => {
                error!("Affine coordinates do not satisfy the curve equation");
                Err(CallerError::DeserializationFailed)?
            }
        }
    }

    /// Serialize the point as a compressed affine-encoded byte array.
    pub fn to_bytes(self) -> Vec<u8> {
        let mut generic_array = AffinePoint::from(self.0).to_bytes();
        let bytes = generic_array.to_vec();
        generic_array.zeroize();
        bytes
    }

    /// Deserialize a point from a compressed affine-encoded byte array.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut fixed_len_bytes: [u8; 33] = bytes.try_into().map_err(|_| {
            error!("Failed to encode bytes as a curve point");
            CallerError::DeserializationFailed
        })?;
        let point: Option<AffinePoint> = AffinePoint::from_bytes(&fixed_len_bytes.into()).into();
        fixed_len_bytes.zeroize();
        match point {
            Some(point) => Ok(Self(point.into())),
            None => {
                error!("Failed to encode bytes as a curve point");
                Err(CallerError::DeserializationFailed)?
            }
        }
    }
}

impl std::ops::Add for CurvePoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AsRef<CurvePoint> for CurvePoint {
    fn as_ref(&self) -> &CurvePoint {
        self
    }
}

impl From<k256::ProjectivePoint> for CurvePoint {
    fn from(p: k256::ProjectivePoint) -> Self {
        Self(p)
    }
}

impl From<CurvePoint> for EncodedPoint {
    fn from(value: CurvePoint) -> EncodedPoint {
        value.0.to_affine().into()
    }
}

impl Serialize for CurvePoint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        AffinePoint::from(self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let p = AffinePoint::deserialize(deserializer)?;
        Ok(Self(p.into()))
    }
}

/// The order `q` of the secp256k1 prime-order group.
pub(crate) fn k256_order() -> BigNumber {
    let order_bytes: [u8; 32] = k256::Secp256k1::ORDER.to_be_bytes();
    BigNumber::from_slice(order_bytes)
}

/// Reduce a [`BigNumber`] into the curve's scalar field.
pub(crate) fn bn_to_scalar(x: &BigNumber) -> Result<Scalar> {
    let reduced = x.nmod(&k256_order());
    let bytes = crate::utils::fixed_be_bytes(&reduced, FieldBytes::default().len())?;
    let scalar: Option<Scalar> = Scalar::from_repr(*FieldBytes::from_slice(&bytes)).into();
    scalar.ok_or_else(|| {
        error!("Failed to convert a reduced BigNumber to a scalar");
        InternalError::InternalInvariantFailed
    })
}

/// Convert a curve scalar to a non-negative [`BigNumber`].
pub(crate) fn scalar_to_bn(x: &Scalar) -> BigNumber {
    BigNumber::from_slice(x.to_bytes())
}

/// Flatten a list of curve points into the integer sequence
/// `(X0, Y0, X1, Y1, ...)` of their affine coordinates.
pub(crate) fn flatten_points(points: &[CurvePoint]) -> Result<Vec<BigNumber>> {
    let mut flat = Vec::with_capacity(points.len() * 2);
    for point in points {
        let (x, y) = point.to_affine_coordinates()?;
        flat.push(x);
        flat.push(y);
    }
    Ok(flat)
}

/// Rebuild a list of curve points from flattened affine coordinates,
/// rejecting coordinate pairs that do not lie on the curve.
pub(crate) fn unflatten_points(flat: &[BigNumber]) -> Result<Vec<CurvePoint>> {
    if flat.len() % 2 != 0 {
        error!("Flattened point list has an odd number of coordinates");
        Err(CallerError::DeserializationFailed)?;
    }
    flat.chunks_exact(2)
        .map(|pair| CurvePoint::try_from_affine_coordinates(&pair[0], &pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;
    use k256::elliptic_curve::Field;

    #[test]
    fn bn_to_scalar_wraps_negative_numbers() {
        let _rng = init_testing();
        let neg1 = BigNumber::zero() - BigNumber::one();
        let scalar = bn_to_scalar(&neg1).unwrap();
        assert_eq!(Scalar::ZERO, scalar + Scalar::ONE);
    }

    #[test]
    fn scalar_round_trip() {
        let mut rng = init_testing();
        for _ in 0..10 {
            let scalar = Scalar::random(&mut rng);
            let bn = scalar_to_bn(&scalar);
            assert_eq!(bn_to_scalar(&bn).unwrap(), scalar);
        }
    }

    #[test]
    fn flatten_round_trip() {
        let mut rng = init_testing();
        let points: Vec<_> = (0..5)
            .map(|_| CurvePoint::GENERATOR.multiply_by_scalar(&Scalar::random(&mut rng)))
            .collect();
        let flat = flatten_points(&points).unwrap();
        assert_eq!(flat.len(), 10);
        let rebuilt = unflatten_points(&flat).unwrap();
        assert_eq!(points, rebuilt);
    }

    #[test]
    fn unflatten_rejects_off_curve_pairs() {
        let mut rng = init_testing();
        let point = CurvePoint::GENERATOR.multiply_by_scalar(&Scalar::random(&mut rng));
        let mut flat = flatten_points(&[point]).unwrap();
        flat[1] = &flat[1] + BigNumber::one();
        assert!(unflatten_points(&flat).is_err());
        assert!(unflatten_points(&flat[..1]).is_err());
    }

    #[test]
    fn identity_has_no_affine_coordinates() {
        assert!(CurvePoint::IDENTITY.to_affine_coordinates().is_err());
    }

    #[test]
    fn point_byte_round_trip() {
        let mut rng = init_testing();
        let point = CurvePoint::GENERATOR.multiply_by_scalar(&Scalar::random(&mut rng));
        let bytes = point.to_bytes();
        assert_eq!(CurvePoint::try_from_bytes(&bytes).unwrap(), point);
    }
}
