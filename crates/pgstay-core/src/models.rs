use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Pending,
    Active,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Pending => "pending",
            TenantStatus::Active => "active",
        }
    }
}

impl FromStr for TenantStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TenantStatus::Pending),
            "active" => Ok(TenantStatus::Active),
            other => Err(UnknownVariant::new("tenant status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentType {
    Rent,
    Deposit,
    Maintenance,
    #[serde(rename = "Manual-Payment")]
    ManualPayment,
    #[serde(rename = "Rent-Payment")]
    RentPayment,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Rent => "Rent",
            PaymentType::Deposit => "Deposit",
            PaymentType::Maintenance => "Maintenance",
            PaymentType::ManualPayment => "Manual-Payment",
            PaymentType::RentPayment => "Rent-Payment",
        }
    }
}

impl FromStr for PaymentType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Rent" => Ok(PaymentType::Rent),
            "Deposit" => Ok(PaymentType::Deposit),
            "Maintenance" => Ok(PaymentType::Maintenance),
            "Manual-Payment" => Ok(PaymentType::ManualPayment),
            "Rent-Payment" => Ok(PaymentType::RentPayment),
            other => Err(UnknownVariant::new("payment type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    #[serde(rename = "UPI")]
    Upi,
    Bank,
    Razorpay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Bank => "Bank",
            PaymentMethod::Razorpay => "Razorpay",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CASH" => Ok(PaymentMethod::Cash),
            "UPI" => Ok(PaymentMethod::Upi),
            "BANK" | "BANK TRANSFER" => Ok(PaymentMethod::Bank),
            "RAZORPAY" | "RAZORPAY-ONLINE" => Ok(PaymentMethod::Razorpay),
            _ => Err(UnknownVariant::new("payment method", value)),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// The login identity behind a tenancy. Owners have identities too, but this
/// workspace only ever creates tenant identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub property_id: Uuid,
    pub room_no: String,
    pub capacity: i32,
    pub price: Decimal,
    pub deposit: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KycDetails {
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub permanent_address: String,
    #[serde(default)]
    pub emergency_contact: String,
    #[serde(default)]
    pub id_proof_type: String,
    #[serde(default)]
    pub id_proof_no: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub mail_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub property_id: Uuid,
    pub room_id: Uuid,
    pub name: String,
    pub phone: String,
    pub status: TenantStatus,
    pub details: KycDetails,
    pub monthly_rent: Decimal,
    pub deposit: Decimal,
    pub balance: Decimal,
    pub admission_date: DateTime<Utc>,
    pub last_billing_date: Option<DateTime<Utc>>,
    pub next_billing_date: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub otp: Option<String>,
    pub is_verified: bool,
    pub last_balance_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedTenant {
    pub id: Uuid,
    pub original_identity_id: Uuid,
    pub name: String,
    pub phone: String,
    pub father_name: String,
    pub permanent_address: String,
    pub id_proof_no: String,
    pub property_id: Uuid,
    pub room_id: Uuid,
    pub admission_date: DateTime<Utc>,
    pub checkout_date: DateTime<Utc>,
}

impl ArchivedTenant {
    pub fn snapshot(profile: &TenantProfile, checkout_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_identity_id: profile.identity_id,
            name: profile.name.clone(),
            phone: profile.phone.clone(),
            father_name: profile.details.father_name.clone(),
            permanent_address: profile.details.permanent_address.clone(),
            id_proof_no: profile.details.id_proof_no.clone(),
            property_id: profile.property_id,
            room_id: profile.room_id,
            admission_date: profile.admission_date,
            checkout_date,
        }
    }
}

/// One row of a property's tenant roster, pending admissions included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantSummary {
    pub identity_id: Uuid,
    pub name: String,
    pub room_no: String,
    pub phone: String,
    pub status: TenantStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomOccupancy {
    pub room_id: Uuid,
    pub occupied: i64,
    pub capacity: i32,
}

impl RoomOccupancy {
    pub fn is_full(&self) -> bool {
        self.occupied >= i64::from(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_type_wire_names_are_stable() {
        assert_eq!(PaymentType::ManualPayment.as_str(), "Manual-Payment");
        assert_eq!(
            serde_json::to_value(PaymentType::RentPayment).unwrap(),
            serde_json::json!("Rent-Payment")
        );
        assert_eq!(
            "Manual-Payment".parse::<PaymentType>().unwrap(),
            PaymentType::ManualPayment
        );
    }

    #[test]
    fn payment_method_parse_accepts_legacy_spellings() {
        assert_eq!("upi".parse::<PaymentMethod>().unwrap(), PaymentMethod::Upi);
        assert_eq!(
            "Bank Transfer".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::Bank
        );
        assert_eq!(
            "Razorpay-Online".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::Razorpay
        );
        let err = "cheque".parse::<PaymentMethod>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported payment method: cheque");
    }

    #[test]
    fn room_occupancy_full_at_capacity() {
        let occupancy = RoomOccupancy {
            room_id: Uuid::new_v4(),
            occupied: 2,
            capacity: 2,
        };
        assert!(occupancy.is_full());
    }
}
