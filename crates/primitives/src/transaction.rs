use alloy_eips::eip2930::AccessList;
use alloy_primitives::{aliases::U192, keccak256, Address, Bytes, ChainId, B256, U256};
use alloy_rlp::{Buf, BufMut, Decodable, Encodable, EMPTY_STRING_CODE};
use core::mem;

/// RIP-7560 account abstraction transaction type byte.
pub const RIP7560_TX_TYPE_ID: u8 = 0x04;

/// Base gas charged for every RIP-7560 transaction before any frame runs.
pub const RIP7560_BASE_TX_GAS: u64 = 15_000;

/// Calldata gas cost per zero byte (EIP-2028).
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Calldata gas cost per non-zero byte (EIP-2028).
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;

/// Access list gas cost per address (EIP-2930).
pub const ACCESS_LIST_ADDRESS_GAS: u64 = 2_400;

/// Access list gas cost per storage key (EIP-2930).
pub const ACCESS_LIST_STORAGE_KEY_GAS: u64 = 1_900;

/// Upper bound on every individual gas field, so that sums of a handful of
/// them can never overflow a `u64`.
pub const MAX_GAS_FIELD: u64 = 1 << 62;

/// Sums gas values, rejecting any summand above [`MAX_GAS_FIELD`].
///
/// Returns `None` if a summand is out of range or the total overflows.
pub fn checked_gas_sum(vals: impl IntoIterator<Item = u64>) -> Option<u64> {
    let mut sum: u64 = 0;
    for val in vals {
        if val > MAX_GAS_FIELD {
            return None;
        }
        sum = sum.checked_add(val)?;
    }
    Some(sum)
}

fn calldata_cost(data: &[u8]) -> u64 {
    let zeros = data.iter().filter(|b| **b == 0).count() as u64;
    let non_zeros = data.len() as u64 - zeros;
    non_zeros * TX_DATA_NON_ZERO_GAS + zeros * TX_DATA_ZERO_GAS
}

/// An RIP-7560 account abstraction transaction.
///
/// Unlike an EOA transaction there are no `v, r, s` fields: authorization is
/// delegated to the sender account contract (and optionally a paymaster and a
/// deployer), so the signing hash doubles as the transaction hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRip7560 {
    /// EIP-155 chain id.
    #[serde(with = "alloy_serde::quantity")]
    pub chain_id: ChainId,

    /// RIP-7712 two-dimensional nonce key (192 bits). Zero selects the
    /// protocol 1-D nonce; any other value requires the on-chain
    /// nonce manager.
    pub nonce_key: U192,

    /// Nonce sequence value.
    #[serde(with = "alloy_serde::quantity")]
    pub nonce: u64,

    /// Max priority fee per gas (EIP-1559).
    pub gas_tip_cap: U256,

    /// Max fee per gas (EIP-1559).
    pub gas_fee_cap: U256,

    /// Gas limit of the account execution frame.
    #[serde(with = "alloy_serde::quantity")]
    pub gas: u64,

    /// Access list (EIP-2930).
    pub access_list: AccessList,

    /// The smart contract account on whose behalf this transaction runs.
    pub sender: Address,

    /// Opaque signature material interpreted by the account contract.
    pub authorization_data: Bytes,

    /// Calldata for the account execution frame.
    pub execution_data: Bytes,

    /// Optional gas sponsor. When absent (or zero) the sender pays.
    pub paymaster: Option<Address>,

    /// Opaque paymaster input.
    pub paymaster_data: Bytes,

    /// Gas limit of the paymaster validation frame.
    #[serde(with = "alloy_serde::quantity")]
    pub paymaster_validation_gas_limit: u64,

    /// Optional factory that deploys the sender account in this transaction.
    pub deployer: Option<Address>,

    /// Opaque deployer input.
    pub deployer_data: Bytes,

    /// Builder side payment, informational for block builders.
    pub builder_fee: U256,

    /// Gas limit shared by the intrinsic cost, the deployer frame and the
    /// account validation frame.
    #[serde(with = "alloy_serde::quantity")]
    pub validation_gas_limit: u64,

    /// Gas limit of the paymaster post-op frame.
    #[serde(with = "alloy_serde::quantity")]
    pub post_op_gas: u64,
}

impl TxRip7560 {
    /// The transaction type byte.
    pub const fn tx_type() -> u8 {
        RIP7560_TX_TYPE_ID
    }

    /// The paymaster, treating the zero address as absent.
    pub fn paymaster(&self) -> Option<Address> {
        self.paymaster.filter(|pm| *pm != Address::ZERO)
    }

    /// The deployer, treating the zero address as absent.
    pub fn deployer(&self) -> Option<Address> {
        self.deployer.filter(|d| *d != Address::ZERO)
    }

    /// The account charged for gas: the paymaster when one is present,
    /// otherwise the sender itself.
    pub fn gas_payer(&self) -> Address {
        self.paymaster().unwrap_or(self.sender)
    }

    /// Whether this transaction uses an RIP-7712 two-dimensional nonce.
    pub fn is_rip7712_nonce(&self) -> bool {
        self.nonce_key > U192::ZERO
    }

    /// Gas charged before any frame runs: base cost, calldata cost over all
    /// four data blobs, and the access list cost.
    ///
    /// Returns `None` when a component exceeds [`MAX_GAS_FIELD`].
    pub fn intrinsic_gas(&self) -> Option<u64> {
        checked_gas_sum([
            RIP7560_BASE_TX_GAS,
            self.calldata_gas_cost()?,
            self.access_list_gas_cost(),
        ])
    }

    fn calldata_gas_cost(&self) -> Option<u64> {
        checked_gas_sum([
            calldata_cost(&self.authorization_data),
            calldata_cost(&self.deployer_data),
            calldata_cost(&self.execution_data),
            calldata_cost(&self.paymaster_data),
        ])
    }

    fn access_list_gas_cost(&self) -> u64 {
        let addresses = self.access_list.len() as u64;
        let storage_keys = self
            .access_list
            .iter()
            .map(|item| item.storage_keys.len())
            .sum::<usize>() as u64;
        addresses * ACCESS_LIST_ADDRESS_GAS + storage_keys * ACCESS_LIST_STORAGE_KEY_GAS
    }

    /// The total amount of gas this transaction can consume across all
    /// frames; the pre-charge and block gas pool reservation are based on it.
    ///
    /// Returns `None` when a field exceeds [`MAX_GAS_FIELD`].
    pub fn total_gas_limit(&self) -> Option<u64> {
        checked_gas_sum([
            self.intrinsic_gas()?,
            self.gas,
            self.validation_gas_limit,
            self.paymaster_validation_gas_limit,
            self.post_op_gas,
        ])
    }

    /// `min(gas_fee_cap, base_fee + gas_tip_cap)`, or the raw fee cap on
    /// chains without a base fee.
    pub fn effective_gas_price(&self, base_fee: Option<U256>) -> U256 {
        match base_fee {
            Some(base_fee) => self
                .gas_fee_cap
                .min(base_fee.saturating_add(self.gas_tip_cap)),
            None => self.gas_fee_cap,
        }
    }

    /// The priority fee actually paid to the coinbase per unit of gas:
    /// `min(gas_tip_cap, gas_fee_cap - base_fee)`. Zero without a base fee.
    pub fn effective_gas_tip(&self, base_fee: Option<U256>) -> U256 {
        match base_fee {
            Some(base_fee) => self
                .gas_tip_cap
                .min(self.gas_fee_cap.saturating_sub(base_fee)),
            None => U256::ZERO,
        }
    }

    /// The hash the account contract authorizes. There is no signature
    /// outside `authorization_data`, so this is also the transaction hash.
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.encoded_2718())
    }

    /// The canonical transaction hash.
    pub fn tx_hash(&self) -> B256 {
        self.signing_hash()
    }

    /// EIP-2718 encoding: the type byte followed by the RLP payload.
    pub fn encoded_2718(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.length());
        self.encode_2718(&mut buf);
        buf
    }

    /// Encodes the type byte followed by the RLP payload into `out`.
    pub fn encode_2718(&self, out: &mut dyn BufMut) {
        out.put_u8(RIP7560_TX_TYPE_ID);
        self.encode(out);
    }

    /// Decodes a transaction from its EIP-2718 encoding.
    pub fn decode_2718(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let ty = buf.first().ok_or(alloy_rlp::Error::InputTooShort)?;
        if *ty != RIP7560_TX_TYPE_ID {
            return Err(alloy_rlp::Error::Custom("unexpected transaction type"));
        }
        buf.advance(1);
        Self::decode(buf)
    }

    /// A heuristic for the in-memory size of the transaction.
    #[inline]
    pub fn size(&self) -> usize {
        mem::size_of::<Self>()
            + self.authorization_data.len()
            + self.execution_data.len()
            + self.paymaster_data.len()
            + self.deployer_data.len()
            + self.access_list.size()
    }
}

fn optional_address_length(addr: Option<Address>) -> usize {
    match addr {
        // The zero address is normalised to the absent form on encode.
        Some(addr) if addr != Address::ZERO => addr.length(),
        _ => 1,
    }
}

fn encode_optional_address(addr: Option<Address>, out: &mut dyn BufMut) {
    match addr {
        Some(addr) if addr != Address::ZERO => addr.encode(out),
        _ => out.put_u8(EMPTY_STRING_CODE),
    }
}

fn decode_optional_address(buf: &mut &[u8]) -> alloy_rlp::Result<Option<Address>> {
    match buf.first() {
        Some(&EMPTY_STRING_CODE) => {
            buf.advance(1);
            Ok(None)
        }
        Some(_) => Ok(Some(Address::decode(buf)?)),
        None => Err(alloy_rlp::Error::InputTooShort),
    }
}

impl TxRip7560 {
    fn rlp_encoded_fields_length(&self) -> usize {
        self.chain_id.length()
            + self.nonce_key.length()
            + self.nonce.length()
            + self.gas_tip_cap.length()
            + self.gas_fee_cap.length()
            + self.gas.length()
            + self.access_list.length()
            + self.sender.length()
            + self.authorization_data.length()
            + self.execution_data.length()
            + optional_address_length(self.paymaster)
            + self.paymaster_data.length()
            + self.paymaster_validation_gas_limit.length()
            + optional_address_length(self.deployer)
            + self.deployer_data.length()
            + self.builder_fee.length()
            + self.validation_gas_limit.length()
            + self.post_op_gas.length()
    }

    fn rlp_encode_fields(&self, out: &mut dyn BufMut) {
        self.chain_id.encode(out);
        self.nonce_key.encode(out);
        self.nonce.encode(out);
        self.gas_tip_cap.encode(out);
        self.gas_fee_cap.encode(out);
        self.gas.encode(out);
        self.access_list.encode(out);
        self.sender.encode(out);
        self.authorization_data.encode(out);
        self.execution_data.encode(out);
        encode_optional_address(self.paymaster, out);
        self.paymaster_data.encode(out);
        self.paymaster_validation_gas_limit.encode(out);
        encode_optional_address(self.deployer, out);
        self.deployer_data.encode(out);
        self.builder_fee.encode(out);
        self.validation_gas_limit.encode(out);
        self.post_op_gas.encode(out);
    }

    fn rlp_decode_fields(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self {
            chain_id: Decodable::decode(buf)?,
            nonce_key: Decodable::decode(buf)?,
            nonce: Decodable::decode(buf)?,
            gas_tip_cap: Decodable::decode(buf)?,
            gas_fee_cap: Decodable::decode(buf)?,
            gas: Decodable::decode(buf)?,
            access_list: Decodable::decode(buf)?,
            sender: Decodable::decode(buf)?,
            authorization_data: Decodable::decode(buf)?,
            execution_data: Decodable::decode(buf)?,
            paymaster: decode_optional_address(buf)?,
            paymaster_data: Decodable::decode(buf)?,
            paymaster_validation_gas_limit: Decodable::decode(buf)?,
            deployer: decode_optional_address(buf)?,
            deployer_data: Decodable::decode(buf)?,
            builder_fee: Decodable::decode(buf)?,
            validation_gas_limit: Decodable::decode(buf)?,
            post_op_gas: Decodable::decode(buf)?,
        })
    }
}

impl Encodable for TxRip7560 {
    fn encode(&self, out: &mut dyn BufMut) {
        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_encoded_fields_length(),
        }
        .encode(out);
        self.rlp_encode_fields(out);
    }

    fn length(&self) -> usize {
        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_encoded_fields_length(),
        }
        .length_with_payload()
    }
}

impl Decodable for TxRip7560 {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        Self::rlp_decode_fields(buf)
    }
}
