//! Dominio del Agregador de Estado.
//!
//! Define la instantánea única que consume el frontend (`EstadoPlanta`), el
//! contenedor nominal de últimas lecturas por feed y las funciones puras de
//! combinación y validación. La instantánea se recalcula completa ante cada
//! tick de cualquier feed (last-write-wins) y nunca se historiza.


use serde::Serialize;
use crate::gateway::domain::{rutas, CambioRemoto};
use crate::system::domain::AppError;


/// Estado de un actuador remoto. Tres valores explícitos: el remoto puede
/// no haber publicado nada todavía.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum EstadoActuador {
    Encendido,
    Apagado,
    #[default]
    Desconocido,
}

impl EstadoActuador {
    pub fn desde(valor: Option<bool>) -> Self {
        match valor {
            Some(true) => EstadoActuador::Encendido,
            Some(false) => EstadoActuador::Apagado,
            None => EstadoActuador::Desconocido,
        }
    }
}


/// Últimos valores conocidos de cada feed, con campos nominales.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lecturas {
    pub bomba: Option<bool>,
    pub luz: Option<bool>,
    pub nivel: Option<f64>,
    pub set_min: Option<f64>,
    pub set_max: Option<f64>,
    pub modo_auto: Option<bool>,
    pub alerta: Option<bool>,
    pub fecha_hora: Option<String>,
    /// Hubo al menos una emisión; mientras sea `false` la instantánea
    /// se publica como cargando.
    pub alguna: bool,
}

impl Lecturas {
    /// Rutea un cambio remoto al campo que corresponde.
    pub fn aplicar(&mut self, cambio: &CambioRemoto) {
        self.alguna = true;
        let valor = cambio.valor.as_ref();
        match cambio.ruta.as_str() {
            rutas::BOMBA => self.bomba = valor.and_then(|v| v.como_bool()),
            rutas::LUZ => self.luz = valor.and_then(|v| v.como_bool()),
            rutas::ULTRASONICO => self.nivel = valor.and_then(|v| v.como_numero()),
            rutas::SET_MIN => self.set_min = valor.and_then(|v| v.como_numero()),
            rutas::SET_MAX => self.set_max = valor.and_then(|v| v.como_numero()),
            rutas::MODE_AUTO => self.modo_auto = valor.and_then(|v| v.como_bool()),
            rutas::ALERTA_SOBRENIVEL => self.alerta = valor.and_then(|v| v.como_bool()),
            rutas::FECHA_HORA => self.fecha_hora = valor.and_then(|v| v.como_texto()),
            _ => {}
        }
    }
}


/// Instantánea agregada que consume el frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstadoPlanta {
    pub cargando: bool,
    pub hay_internet: bool,
    pub conectado: bool,
    pub error: Option<String>,

    pub bomba: EstadoActuador,
    pub luz: EstadoActuador,

    pub nivel_actual: Option<f64>,
    pub set_min: Option<f64>,
    pub set_max: Option<f64>,

    pub modo_automatico: bool,
    pub alerta_sobrenivel: bool,
    pub fecha_hora: Option<String>,
}

impl Default for EstadoPlanta {
    fn default() -> Self {
        EstadoPlanta {
            cargando: true,
            hay_internet: true,
            conectado: true,
            error: None,
            bomba: EstadoActuador::Desconocido,
            luz: EstadoActuador::Desconocido,
            nivel_actual: None,
            set_min: None,
            set_max: None,
            modo_automatico: false,
            alerta_sobrenivel: false,
            fecha_hora: None,
        }
    }
}


/// Combina las últimas lecturas y las señales de conectividad en una
/// instantánea. `setMin ≤ setMax` no se valida acá: sólo al escribir.
pub fn combinar(lecturas: &Lecturas, hay_internet: bool, conectado: bool) -> EstadoPlanta {
    EstadoPlanta {
        cargando: !lecturas.alguna,
        hay_internet,
        conectado,
        error: None,
        bomba: EstadoActuador::desde(lecturas.bomba),
        luz: EstadoActuador::desde(lecturas.luz),
        nivel_actual: lecturas.nivel,
        set_min: lecturas.set_min,
        set_max: lecturas.set_max,
        modo_automatico: lecturas.modo_auto == Some(true),
        alerta_sobrenivel: lecturas.alerta == Some(true),
        fecha_hora: lecturas.fecha_hora.clone(),
    }
}


/// Novedades que serializa el agregador: feeds, conectividad y fallas.
#[derive(Debug, Clone, PartialEq)]
pub enum Actualizacion {
    Cambio(CambioRemoto),
    Conexion(bool),
    Internet(bool),
    Fallo(String),
}


/// Comandos imperativos del frontend hacia el agregador.
#[derive(Debug, Clone, PartialEq)]
pub enum Comando {
    ToggleBomba,
    GuardarSetpoints { min: f64, max: f64 },
    SetModoAutomatico(bool),
    Reconectar,
}


pub fn redondear2(valor: f64) -> f64 {
    (valor * 100.0).round() / 100.0
}


/// Redondea ambos setpoints a 2 decimales y rechaza `min > max`.
pub fn validar_setpoints(min: f64, max: f64) -> Result<(f64, f64), AppError> {
    let min = redondear2(min);
    let max = redondear2(max);
    if min > max {
        return Err(AppError::Validacion("min no puede ser mayor que max".to_string()));
    }
    Ok((min, max))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::domain::Valor;

    fn cambio(ruta: &str, valor: Valor) -> CambioRemoto {
        CambioRemoto { ruta: ruta.to_string(), valor: Some(valor) }
    }

    #[test]
    fn combina_todos_los_feeds_en_la_tupla_exacta() {
        let mut lecturas = Lecturas::default();
        lecturas.aplicar(&cambio(rutas::BOMBA, Valor::Bool(true)));
        lecturas.aplicar(&cambio(rutas::LUZ, Valor::Bool(true)));
        lecturas.aplicar(&cambio(rutas::ULTRASONICO, Valor::Numero(55.0)));
        lecturas.aplicar(&cambio(rutas::SET_MIN, Valor::Numero(30.0)));
        lecturas.aplicar(&cambio(rutas::SET_MAX, Valor::Numero(80.0)));
        lecturas.aplicar(&cambio(rutas::MODE_AUTO, Valor::Bool(false)));
        lecturas.aplicar(&cambio(rutas::ALERTA_SOBRENIVEL, Valor::Bool(false)));

        let estado = combinar(&lecturas, true, true);

        assert_eq!(estado, EstadoPlanta {
            cargando: false,
            hay_internet: true,
            conectado: true,
            error: None,
            bomba: EstadoActuador::Encendido,
            luz: EstadoActuador::Encendido,
            nivel_actual: Some(55.0),
            set_min: Some(30.0),
            set_max: Some(80.0),
            modo_automatico: false,
            alerta_sobrenivel: false,
            fecha_hora: None,
        });
    }

    #[test]
    fn sin_emisiones_queda_cargando() {
        let estado = combinar(&Lecturas::default(), true, true);
        assert!(estado.cargando);
        assert_eq!(estado.bomba, EstadoActuador::Desconocido);
    }

    #[test]
    fn ruta_vaciada_vuelve_a_desconocido() {
        let mut lecturas = Lecturas::default();
        lecturas.aplicar(&cambio(rutas::BOMBA, Valor::Bool(true)));
        lecturas.aplicar(&CambioRemoto { ruta: rutas::BOMBA.to_string(), valor: None });

        let estado = combinar(&lecturas, true, true);
        assert_eq!(estado.bomba, EstadoActuador::Desconocido);
        assert!(!estado.cargando);
    }

    #[test]
    fn setpoints_se_redondean_a_dos_decimales() {
        let (min, max) = validar_setpoints(10.006, 49.994).expect("rango válido");
        assert_eq!(min, 10.01);
        assert_eq!(max, 49.99);
    }

    #[test]
    fn setpoints_invertidos_se_rechazan() {
        let resultado = validar_setpoints(50.0, 30.0);
        assert!(matches!(resultado, Err(AppError::Validacion(_))));
    }

    #[test]
    fn redondeo_puede_igualar_los_limites() {
        // 10.004 redondea a 10.0: deja de ser mayor que max.
        let (min, max) = validar_setpoints(10.004, 10.0).expect("rango válido tras redondeo");
        assert_eq!(min, 10.0);
        assert_eq!(max, 10.0);
    }
}
