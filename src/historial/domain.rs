//! Dominio del historial de auditoría.
//!
//! Cada acción que cambia estado produce un registro inmutable, sólo-append.
//! Este módulo define el registro, la bitácora rodante en memoria (fusión
//! optimista sobre la consulta de respaldo), la clasificación de eventos en
//! etiquetas de presentación y el filtrado puro y síncrono.


use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};


/// Registro de auditoría. Inmutable una vez agregado; expira en el almacén
/// tras la ventana de retención.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventoHistorial {
    /// Fecha calendario local de la planta, `%Y-%m-%d`.
    pub fecha: String,
    /// Hora local de la planta, `%H:%M:%S`.
    pub hora: String,
    /// Categoría cruda: `Sesion`, `Bomba`, `Setpoint`, `Cambio_rol`, `Eliminacion`.
    pub tipo: String,
    /// Descripción legible de la transición.
    pub nombre: String,
    pub estado: bool,
    pub correo: String,
    pub rol: String,
    /// Epoch millis, clave de ordenamiento.
    pub timestamp: i64,
}


/// Criterios transitorios de consulta; viven sólo en el estado del frontend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiltrosHistorial {
    /// Igualdad (sin mayúsculas) contra la etiqueta clasificada, no el tipo crudo.
    pub evento: String,
    /// Subcadena sobre `correo`.
    pub usuario: String,
    /// Subcadena sobre `rol`.
    pub rol: String,
    /// Rango de fechas inclusivo contra la fecha calendario del registro.
    pub fecha_inicio: Option<NaiveDate>,
    pub fecha_fin: Option<NaiveDate>,
    /// Búsqueda libre por subcadena sobre `nombre`.
    pub texto: String,
}


/// Acciones hacia la tarea de historial.
#[derive(Debug, Clone, PartialEq)]
pub enum AccionHistorial {
    Registrar {
        tipo: String,
        nombre: String,
        estado: bool,
        /// Si no se provee, firma el principal de la sesión.
        correo_manual: Option<String>,
        rol_manual: Option<String>,
    },
    Cargar { limite: i64 },
}


/// Arma un registro con fecha y hora derivadas en la zona horaria de la planta.
pub fn crear_evento(tipo: &str,
                    nombre: &str,
                    estado: bool,
                    correo: &str,
                    rol: &str,
                    zona: Tz) -> EventoHistorial {

    let ahora = Utc::now();
    let local = ahora.with_timezone(&zona);

    EventoHistorial {
        fecha: local.format("%Y-%m-%d").to_string(),
        hora: local.format("%H:%M:%S").to_string(),
        tipo: tipo.to_string(),
        nombre: nombre.to_string(),
        estado,
        correo: correo.to_string(),
        rol: rol.to_string(),
        timestamp: ahora.timestamp_millis(),
    }
}


/// Reduce un registro a su etiqueta de presentación.
///
/// Regla: un `Setpoint` cuyo nombre menciona "ultrasonico" es la edición de
/// nivel; `Cambio_rol`, `Bomba` y `Sesion` mapean a etiquetas fijas; el
/// resto cae a `"{tipo} - {nombre hasta el primer ':'}"`.
pub fn clasificar_evento(evento: &EventoHistorial) -> String {
    let tipo = evento.tipo.as_str();

    if tipo.eq_ignore_ascii_case("Setpoint")
        && evento.nombre.to_lowercase().contains("ultrasonico") {
        return "Setpoint - Nivel".to_string();
    }
    if tipo.eq_ignore_ascii_case("Cambio_rol") {
        return "Cambio de rol".to_string();
    }
    if tipo.eq_ignore_ascii_case("Bomba") {
        return "Bomba".to_string();
    }
    if tipo.eq_ignore_ascii_case("Sesion") {
        return "Sesión".to_string();
    }

    let prefijo = evento.nombre.split(':').next().unwrap_or_default().trim();
    format!("{} - {}", evento.tipo, prefijo)
}


/// Predicado puro y síncrono sobre la lista en memoria.
pub fn filtrar(lista: &[EventoHistorial], filtros: &FiltrosHistorial) -> Vec<EventoHistorial> {
    lista.iter().filter(|e| cumple(e, filtros)).cloned().collect()
}

fn cumple(evento: &EventoHistorial, filtros: &FiltrosHistorial) -> bool {
    (filtros.evento.is_empty()
        || clasificar_evento(evento).to_lowercase() == filtros.evento.to_lowercase())
        && (filtros.usuario.is_empty()
            || evento.correo.to_lowercase().contains(&filtros.usuario.to_lowercase()))
        && (filtros.rol.is_empty()
            || evento.rol.to_lowercase().contains(&filtros.rol.to_lowercase()))
        && en_rango(evento, filtros)
        && (filtros.texto.is_empty()
            || evento.nombre.to_lowercase().contains(&filtros.texto.to_lowercase()))
}

fn en_rango(evento: &EventoHistorial, filtros: &FiltrosHistorial) -> bool {
    if filtros.fecha_inicio.is_none() && filtros.fecha_fin.is_none() {
        return true;
    }
    match NaiveDate::parse_from_str(&evento.fecha, "%Y-%m-%d") {
        Ok(fecha) => {
            filtros.fecha_inicio.is_none_or(|inicio| fecha >= inicio)
                && filtros.fecha_fin.is_none_or(|fin| fecha <= fin)
        }
        // Fecha ilegible: fuera de cualquier rango pedido.
        Err(_) => false,
    }
}


/// Bitácora rodante en memoria, más nueva primero.
///
/// Un registro recién creado se agrega acá antes de que el almacén confirme
/// la escritura, así queda visible de inmediato; la carga de respaldo
/// reemplaza la base sobre la que se fusiona.
#[derive(Debug, Default)]
pub struct RegistroHistorial {
    eventos: Vec<EventoHistorial>,
}

impl RegistroHistorial {
    pub fn agregar(&mut self, evento: EventoHistorial) {
        self.eventos.insert(0, evento);
    }

    /// Recibe la consulta de respaldo en orden ascendente y la invierte
    /// localmente a más-nuevo-primero.
    pub fn reemplazar_base(&mut self, mut ascendente: Vec<EventoHistorial>) {
        ascendente.reverse();
        self.eventos = ascendente;
    }

    pub fn eventos(&self) -> &[EventoHistorial] {
        &self.eventos
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn evento(tipo: &str, nombre: &str) -> EventoHistorial {
        EventoHistorial {
            fecha: "2026-08-26".to_string(),
            hora: "10:30:00".to_string(),
            tipo: tipo.to_string(),
            nombre: nombre.to_string(),
            estado: true,
            correo: "ana@planta.com".to_string(),
            rol: "admin".to_string(),
            timestamp: 1_756_100_000_000,
        }
    }

    #[test]
    fn setpoint_ultrasonico_clasifica_como_nivel() {
        let e = evento("Setpoint", "setpoint_ultrasonico_min=10.0, setpoint_ultrasonico_max=50.0");
        assert_eq!(clasificar_evento(&e), "Setpoint - Nivel");
    }

    #[test]
    fn bomba_ignora_la_descripcion() {
        let e = evento("Bomba", "cualquier texto: incluso con dos puntos");
        assert_eq!(clasificar_evento(&e), "Bomba");
        let e = evento("bomba", "");
        assert_eq!(clasificar_evento(&e), "Bomba");
    }

    #[test]
    fn tipos_restantes_caen_al_formato_generico() {
        let e = evento("Eliminacion", "Usuario: pepe@planta.com");
        assert_eq!(clasificar_evento(&e), "Eliminacion - Usuario");

        let e = evento("Sesion", "lo que sea");
        assert_eq!(clasificar_evento(&e), "Sesión");
    }

    #[test]
    fn filtra_por_etiqueta_clasificada() {
        let lista = vec![
            evento("Setpoint", "setpoint_ultrasonico_min=10.0"),
            evento("Bomba", "Bomba: apagada → encendida"),
        ];
        let filtros = FiltrosHistorial {
            evento: "setpoint - nivel".to_string(),
            ..Default::default()
        };
        let resultado = filtrar(&lista, &filtros);
        assert_eq!(resultado.len(), 1);
        assert_eq!(resultado[0].tipo, "Setpoint");
    }

    #[test]
    fn filtra_por_subcadena_de_usuario_y_rol() {
        let mut otro = evento("Bomba", "x");
        otro.correo = "jose@planta.com".to_string();
        otro.rol = "invitado".to_string();
        let lista = vec![evento("Bomba", "x"), otro];

        let filtros = FiltrosHistorial { usuario: "ANA".to_string(), ..Default::default() };
        assert_eq!(filtrar(&lista, &filtros).len(), 1);

        let filtros = FiltrosHistorial { rol: "invit".to_string(), ..Default::default() };
        assert_eq!(filtrar(&lista, &filtros).len(), 1);
    }

    #[test]
    fn rango_de_fechas_es_inclusivo() {
        let lista = vec![evento("Bomba", "x")];
        let dia = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();

        let filtros = FiltrosHistorial {
            fecha_inicio: Some(dia),
            fecha_fin: Some(dia),
            ..Default::default()
        };
        assert_eq!(filtrar(&lista, &filtros).len(), 1);

        let filtros = FiltrosHistorial {
            fecha_inicio: Some(dia.succ_opt().unwrap()),
            fecha_fin: None,
            ..Default::default()
        };
        assert!(filtrar(&lista, &filtros).is_empty());
    }

    #[test]
    fn fecha_ilegible_queda_fuera_del_rango() {
        let mut malo = evento("Bomba", "x");
        malo.fecha = "26/08/2026".to_string();
        let filtros = FiltrosHistorial {
            fecha_inicio: NaiveDate::from_ymd_opt(2020, 1, 1),
            ..Default::default()
        };
        assert!(filtrar(&[malo], &filtros).is_empty());
    }

    #[test]
    fn lo_agregado_es_visible_antes_de_confirmar() {
        let mut registro = RegistroHistorial::default();
        registro.reemplazar_base(vec![evento("Sesion", "viejo")]);

        registro.agregar(evento("Bomba", "Bomba: apagada → encendida"));

        // Sin ninguna confirmación del almacén, el evento ya encabeza la lista.
        assert_eq!(registro.eventos().len(), 2);
        assert_eq!(registro.eventos()[0].tipo, "Bomba");
    }

    #[test]
    fn la_base_ascendente_queda_mas_nuevo_primero() {
        let mut primero = evento("Sesion", "a");
        primero.timestamp = 1;
        let mut segundo = evento("Bomba", "b");
        segundo.timestamp = 2;

        let mut registro = RegistroHistorial::default();
        registro.reemplazar_base(vec![primero, segundo]);

        assert_eq!(registro.eventos()[0].timestamp, 2);
        assert_eq!(registro.eventos()[1].timestamp, 1);
    }
}
